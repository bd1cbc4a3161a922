//! Authentication service
//!
//! Owns the token codec, the key store and the user loader. New tokens are
//! signed with the current signing key; verification tries every key in the
//! store so tokens signed before a rotation keep working until their key is
//! retired.

use crate::{
    token::{codec_from_settings, Key, KeyStore, Token, TokenCodec},
    user::{AuthHook, User, UserLoader},
};
use keyward_core::{AuthSettings, KeywardError, KeywardResult};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};
use tracing::{debug, info, warn};

pub struct AuthService<U: User> {
    codec: Arc<dyn TokenCodec>,
    keys: KeyStore,
    signing: RwLock<(String, Key)>,
    next_key_index: AtomicUsize,
    audience: String,
    loader: Arc<dyn UserLoader<U>>,
    hooks: Vec<Arc<dyn AuthHook<U>>>,
}

impl<U: User> AuthService<U> {
    /// Build from explicit parts. The first key signs, all of them verify.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(
        codec: Arc<dyn TokenCodec>,
        keys: Vec<Key>,
        audience: impl Into<String>,
        key_snapshot_ttl: Duration,
        loader: Arc<dyn UserLoader<U>>,
    ) -> KeywardResult<Self> {
        let signing = keys.first().cloned().ok_or_else(|| {
            KeywardError::invalid_configuration("no token keys are configured")
        })?;

        let store = KeyStore::new(key_snapshot_ttl);
        for (index, key) in keys.into_iter().enumerate() {
            store.add(key_id(index), key);
        }

        Ok(Self {
            codec,
            next_key_index: AtomicUsize::new(store.len()),
            keys: store,
            signing: RwLock::new((key_id(0), signing)),
            audience: audience.into(),
            loader,
            hooks: Vec::new(),
        })
    }

    /// Build the codec and key store described by `settings`.
    pub fn from_settings(
        settings: &AuthSettings,
        loader: Arc<dyn UserLoader<U>>,
    ) -> KeywardResult<Self> {
        let token = &settings.token;
        let codec = codec_from_settings(token)?;
        let keys = token
            .keys
            .iter()
            .map(|material| Key::from_material(material))
            .collect::<KeywardResult<Vec<_>>>()?;

        let service = Self::new(
            codec,
            keys,
            token.audience.clone(),
            Duration::from_secs(settings.key_snapshot_ttl_secs),
            loader,
        )?;
        info!(
            codec = service.codec.name(),
            algorithm = %token.algorithm,
            keys = service.keys.len(),
            "Authentication service ready"
        );
        Ok(service)
    }

    pub fn with_hook(mut self, hook: Arc<dyn AuthHook<U>>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }

    pub fn loader(&self) -> &Arc<dyn UserLoader<U>> {
        &self.loader
    }

    pub fn codec(&self) -> &Arc<dyn TokenCodec> {
        &self.codec
    }

    pub fn signing_key_id(&self) -> String {
        self.signing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .clone()
    }

    /// Sign a token for `subject` with the current signing key
    pub fn issue(&self, subject: &str, audiences: &[&str]) -> KeywardResult<String> {
        let key = self
            .signing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .1
            .clone();
        let bytes = self.codec.encode(&key, subject, audiences)?;
        String::from_utf8(bytes)
            .map_err(|_| KeywardError::invalid_token("codec produced a non UTF-8 token"))
    }

    /// Decode `token` with the first key that accepts it.
    pub fn verify(&self, token: &str) -> KeywardResult<Token> {
        let keys = self.keys.snapshot();
        if keys.is_empty() {
            return Err(KeywardError::invalid_token("no verification keys available"));
        }

        for key in keys.iter() {
            match self.codec.decode(key, token.as_bytes()) {
                Ok(token) => return Ok(token),
                Err(e) => debug!(error = %e, "Key did not verify token"),
            }
        }

        Err(KeywardError::invalid_token(
            "token did not verify against any key",
        ))
    }

    /// Check credentials and issue a token for the user.
    pub async fn login(&self, login_id: &str, password: &str) -> KeywardResult<(U, String)> {
        for hook in &self.hooks {
            hook.before_login(login_id, password).await?;
        }

        let user = self.loader.load_user(login_id, password).await?;
        let mut token = self.issue(user.login_id(), &[self.audience.as_str()])?;

        for hook in &self.hooks {
            hook.after_login(&user, &mut token).await?;
        }

        info!(login_id = %user.login_id(), "User logged in");
        Ok((user, token))
    }

    pub async fn logout(&self, user: &U) -> KeywardResult<()> {
        for hook in &self.hooks {
            hook.before_logout(user).await?;
        }
        for hook in &self.hooks {
            hook.after_logout(user).await?;
        }

        info!(login_id = %user.login_id(), "User logged out");
        Ok(())
    }

    /// Add `key` and sign new tokens with it. Returns the new key id.
    pub fn rotate_signing_key(&self, key: Key) -> String {
        let id = key_id(self.next_key_index.fetch_add(1, Ordering::SeqCst));
        self.keys.add(id.clone(), key.clone());
        *self.signing.write().unwrap_or_else(PoisonError::into_inner) = (id.clone(), key);
        info!(key_id = %id, "Rotated signing key");
        id
    }

    /// Stop accepting tokens signed with key `id`.
    pub fn retire_key(&self, id: &str) -> KeywardResult<()> {
        if self.signing_key_id() == id {
            return Err(KeywardError::validation(
                "the signing key cannot be retired",
                Some("key_id"),
            ));
        }

        match self.keys.remove(id) {
            Some(_) => {
                info!(key_id = %id, "Retired verification key");
                Ok(())
            }
            None => {
                warn!(key_id = %id, "Tried to retire an unknown key");
                Err(KeywardError::not_found(format!("key '{}'", id)))
            }
        }
    }
}

fn key_id(index: usize) -> String {
    format!("key-{}", index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{HeadlessJwtCodec, JwtCodec};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TestUser {
        id: String,
        role: String,
    }

    impl User for TestUser {
        fn login_id(&self) -> &str {
            &self.id
        }

        fn name(&self) -> &str {
            &self.id
        }

        fn role_name(&self) -> &str {
            &self.role
        }
    }

    struct FixedLoader;

    #[async_trait]
    impl UserLoader<TestUser> for FixedLoader {
        async fn user_by_id(&self, login_id: &str) -> KeywardResult<TestUser> {
            match login_id {
                "alice" => Ok(TestUser {
                    id: "alice".to_string(),
                    role: "admin".to_string(),
                }),
                other => Err(KeywardError::not_found(format!("user '{}'", other))),
            }
        }

        async fn load_user(&self, login_id: &str, password: &str) -> KeywardResult<TestUser> {
            if password != "wonderland" {
                return Err(KeywardError::InvalidCredentials);
            }
            self.user_by_id(login_id)
                .await
                .map_err(|_| KeywardError::InvalidCredentials)
        }
    }

    struct Suffix;

    #[async_trait]
    impl AuthHook<TestUser> for Suffix {
        async fn before_login(&self, login_id: &str, _password: &str) -> KeywardResult<()> {
            if login_id == "mallory" {
                return Err(KeywardError::Unauthorized);
            }
            Ok(())
        }

        async fn after_login(&self, _user: &TestUser, token: &mut String) -> KeywardResult<()> {
            token.push_str("-hooked");
            Ok(())
        }
    }

    fn service(keys: Vec<Key>) -> AuthService<TestUser> {
        let codec = HeadlessJwtCodec::new(JwtCodec::new("HS256").unwrap().with_audience("svc"))
            .unwrap();
        AuthService::new(
            Arc::new(codec),
            keys,
            "svc",
            Duration::from_secs(600),
            Arc::new(FixedLoader),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_token() {
        let service = service(vec![Key::symmetric(b"k0")]);
        let (user, token) = service.login("alice", "wonderland").await.unwrap();
        assert_eq!(user.login_id(), "alice");

        let verified = service.verify(&token).unwrap();
        assert_eq!(verified.subject, "alice");
        assert_eq!(verified.audience, vec!["svc"]);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let service = service(vec![Key::symmetric(b"k0")]);
        assert!(matches!(
            service.login("alice", "looking-glass").await,
            Err(KeywardError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_hooks_run_around_login() {
        let service = service(vec![Key::symmetric(b"k0")]).with_hook(Arc::new(Suffix));
        let (_, token) = service.login("alice", "wonderland").await.unwrap();
        assert!(token.ends_with("-hooked"));

        assert!(matches!(
            service.login("mallory", "wonderland").await,
            Err(KeywardError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_verification_tries_every_key() {
        let old = service(vec![Key::symmetric(b"old")]);
        let token = old.issue("alice", &["svc"]).unwrap();

        let rotated = service(vec![Key::symmetric(b"new"), Key::symmetric(b"old")]);
        assert_eq!(rotated.verify(&token).unwrap().subject, "alice");

        let unrelated = service(vec![Key::symmetric(b"new")]);
        assert!(matches!(
            unrelated.verify(&token),
            Err(KeywardError::InvalidToken { .. })
        ));
    }

    #[tokio::test]
    async fn test_rotation_and_retirement() {
        let service = service(vec![Key::symmetric(b"k0")]);
        let before = service.issue("alice", &["svc"]).unwrap();

        let new_id = service.rotate_signing_key(Key::symmetric(b"k1"));
        assert_eq!(new_id, "key-1");
        assert_eq!(service.signing_key_id(), "key-1");

        let after = service.issue("alice", &["svc"]).unwrap();
        assert!(service.verify(&before).is_ok());
        assert!(service.verify(&after).is_ok());

        service.retire_key("key-0").unwrap();
        assert!(service.verify(&before).is_err());
        assert!(service.verify(&after).is_ok());

        assert!(service.retire_key("key-1").is_err());
        assert!(service.retire_key("key-0").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_garbage_is_rejected() {
        let service = service(vec![Key::symmetric(b"k0")]);
        assert!(matches!(
            service.verify("not-a-token"),
            Err(KeywardError::InvalidToken { .. })
        ));
    }

    #[tokio::test]
    async fn test_requires_a_key() {
        let codec = JwtCodec::new("HS256").unwrap();
        let result = AuthService::<TestUser>::new(
            Arc::new(codec),
            Vec::new(),
            "svc",
            Duration::from_secs(600),
            Arc::new(FixedLoader),
        );
        assert!(matches!(
            result,
            Err(KeywardError::InvalidConfiguration { .. })
        ));
    }
}
