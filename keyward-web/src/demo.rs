//! Demo user model for the bundled binary
//!
//! An in-memory user table with argon2 password hashes. Real deployments
//! plug their own [`UserLoader`] into [`crate::AppBuilder`].

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use keyward_auth::{User, UserLoader};
use keyward_core::{KeywardError, KeywardResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoUser {
    pub login_id: String,
    pub name: String,
    pub role: String,
}

impl DemoUser {
    pub fn new(login_id: &str, name: &str, role: &str) -> Self {
        Self {
            login_id: login_id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
        }
    }
}

impl User for DemoUser {
    fn login_id(&self) -> &str {
        &self.login_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn role_name(&self) -> &str {
        &self.role
    }
}

#[derive(Debug, Default)]
pub struct DemoUserLoader {
    users: HashMap<String, (DemoUser, String)>,
}

impl DemoUserLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `admin` user holding the `admin` role. The password comes from
    /// `KEYWARD_ADMIN_PASSWORD`.
    pub fn from_env() -> KeywardResult<Self> {
        let password = std::env::var("KEYWARD_ADMIN_PASSWORD").unwrap_or_else(|_| {
            warn!("KEYWARD_ADMIN_PASSWORD is not set, using the default admin password");
            "admin".to_string()
        });
        Self::new().with_user(DemoUser::new("admin", "Administrator", "admin"), &password)
    }

    pub fn with_user(mut self, user: DemoUser, password: &str) -> KeywardResult<Self> {
        let hash = hash_password(password)?;
        self.users.insert(user.login_id.clone(), (user, hash));
        Ok(self)
    }
}

#[async_trait]
impl UserLoader<DemoUser> for DemoUserLoader {
    async fn user_by_id(&self, login_id: &str) -> KeywardResult<DemoUser> {
        self.users
            .get(login_id)
            .map(|(user, _)| user.clone())
            .ok_or_else(|| KeywardError::not_found(format!("user '{}'", login_id)))
    }

    async fn load_user(&self, login_id: &str, password: &str) -> KeywardResult<DemoUser> {
        let (user, hash) = self
            .users
            .get(login_id)
            .ok_or(KeywardError::InvalidCredentials)?;

        if !verify_password(password, hash) {
            return Err(KeywardError::InvalidCredentials);
        }
        Ok(user.clone())
    }
}

fn hash_password(password: &str) -> KeywardResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| KeywardError::invalid_configuration(format!("failed to hash password: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}
