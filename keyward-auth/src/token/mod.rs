//! Bearer tokens
//!
//! A [`TokenCodec`] turns a subject plus audiences into signed bytes and back.
//! Two codecs exist: plain JWT and a headless JWT that drops the constant
//! header segment from the wire form.

mod jwt;
mod key;

pub use jwt::{Clock, HeadlessJwtCodec, JwtCodec};
pub use key::{Key, KeyStore};

use chrono::{DateTime, Utc};
use keyward_core::{
    settings::{CODEC_HEADLESS_JWT, CODEC_JWT},
    KeywardError, KeywardResult, TokenSettings,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// Verified claims. Only produced by a successful decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub issuer: Option<String>,
    pub subject: String,
    pub audience: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub issued_at: DateTime<Utc>,
}

/// Signs and verifies tokens against a single key
pub trait TokenCodec: Send + Sync {
    /// Codec type name as used in configuration
    fn name(&self) -> &'static str;

    fn encode(&self, key: &Key, subject: &str, audiences: &[&str]) -> KeywardResult<Vec<u8>>;

    /// Fails with [`KeywardError::InvalidToken`] for anything that does not verify
    fn decode(&self, key: &Key, token: &[u8]) -> KeywardResult<Token>;
}

/// Build the codec named by `settings.codec`.
pub fn codec_from_settings(settings: &TokenSettings) -> KeywardResult<Arc<dyn TokenCodec>> {
    let mut jwt = JwtCodec::new(&settings.algorithm)?;
    if !settings.issuer.is_empty() {
        jwt = jwt.with_issuer(&settings.issuer);
    }
    if !settings.audience.is_empty() {
        jwt = jwt.with_audience(&settings.audience);
    }
    jwt = jwt.with_ttl((settings.ttl_secs > 0).then(|| Duration::from_secs(settings.ttl_secs)));
    if settings.use_not_before {
        jwt = jwt.with_not_before();
    }

    match settings.codec.as_str() {
        CODEC_JWT => Ok(Arc::new(jwt)),
        CODEC_HEADLESS_JWT => Ok(Arc::new(HeadlessJwtCodec::new(jwt)?)),
        other => Err(KeywardError::invalid_configuration(format!(
            "invalid token codec '{}' (valid types: {}, {})",
            other, CODEC_JWT, CODEC_HEADLESS_JWT
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builds_both_codecs() {
        let mut settings = TokenSettings::default();
        assert_eq!(codec_from_settings(&settings).unwrap().name(), CODEC_HEADLESS_JWT);

        settings.codec = CODEC_JWT.to_string();
        assert_eq!(codec_from_settings(&settings).unwrap().name(), CODEC_JWT);
    }

    #[test]
    fn test_registry_rejects_unknown_codec_and_algorithm() {
        let mut settings = TokenSettings::default();
        settings.codec = "paseto".to_string();
        assert!(matches!(
            codec_from_settings(&settings),
            Err(KeywardError::InvalidConfiguration { .. })
        ));

        let mut settings = TokenSettings::default();
        settings.algorithm = "none".to_string();
        assert!(matches!(
            codec_from_settings(&settings),
            Err(KeywardError::InvalidConfiguration { .. })
        ));
    }
}
