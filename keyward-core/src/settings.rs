//! Settings model and loader
//!
//! Settings come from an optional TOML file, then `KEYWARD_*` environment
//! variables override individual fields.

use crate::error::{KeywardError, KeywardResult};
use crate::logging::LoggingConfig;
use base64::{prelude::BASE64_STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Codec types accepted in `auth.token.codec`
pub const CODEC_JWT: &str = "jwt";
pub const CODEC_HEADLESS_JWT: &str = "headless-jwt";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingConfig,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Install the authentication and RBAC middleware
    pub enabled: bool,
    pub token: TokenSettings,
    /// How long the verification key snapshot stays memoised
    pub key_snapshot_ttl_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            token: TokenSettings::default(),
            key_snapshot_ttl_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    /// `jwt` or `headless-jwt`
    pub codec: String,
    /// JWS algorithm name, e.g. `HS256`, `RS256`, `EdDSA`
    pub algorithm: String,
    pub issuer: String,
    pub audience: String,
    /// Token lifetime; zero issues tokens without an expiry
    pub ttl_secs: u64,
    pub use_not_before: bool,
    /// Key material. The first entry signs new tokens, all of them verify.
    ///
    /// `pem:<private.pem>,<public.pem>` loads an asymmetric pair,
    /// `base64:<data>` a decoded secret, anything else is a raw secret.
    pub keys: Vec<String>,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            codec: CODEC_HEADLESS_JWT.to_string(),
            algorithm: "HS256".to_string(),
            issuer: "keyward".to_string(),
            audience: "keyward".to_string(),
            ttl_secs: 24 * 60 * 60,
            use_not_before: false,
            keys: vec![BASE64_STANDARD.encode(Sha256::digest(b"secret"))],
        }
    }
}

impl Settings {
    /// Load from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> KeywardResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content).map_err(|e| {
            KeywardError::invalid_configuration(format!(
                "Failed to parse {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Load the file when given, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> KeywardResult<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `KEYWARD_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> KeywardResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("KEYWARD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("KEYWARD_PORT") {
            self.server.port = port.parse().map_err(|_| {
                KeywardError::invalid_configuration(format!("KEYWARD_PORT is not a port: {port}"))
            })?;
        }
        if let Some(level) = lookup("KEYWARD_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(enabled) = lookup("KEYWARD_AUTH_ENABLED") {
            self.auth.enabled = enabled.parse().map_err(|_| {
                KeywardError::invalid_configuration(format!(
                    "KEYWARD_AUTH_ENABLED must be true or false, got {enabled}"
                ))
            })?;
        }

        let token = &mut self.auth.token;
        if let Some(codec) = lookup("KEYWARD_TOKEN_CODEC") {
            token.codec = codec;
        }
        if let Some(algorithm) = lookup("KEYWARD_TOKEN_ALGORITHM") {
            token.algorithm = algorithm;
        }
        if let Some(issuer) = lookup("KEYWARD_TOKEN_ISSUER") {
            token.issuer = issuer;
        }
        if let Some(audience) = lookup("KEYWARD_TOKEN_AUDIENCE") {
            token.audience = audience;
        }
        if let Some(ttl) = lookup("KEYWARD_TOKEN_TTL_SECS") {
            token.ttl_secs = ttl.parse().map_err(|_| {
                KeywardError::invalid_configuration(format!(
                    "KEYWARD_TOKEN_TTL_SECS is not a number: {ttl}"
                ))
            })?;
        }
        if let Some(keys) = lookup("KEYWARD_TOKEN_KEYS") {
            token.keys = keys
                .split(';')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    /// Startup checks; any failure here is fatal.
    ///
    /// Keys are required even with auth disabled since the login endpoint
    /// still issues tokens.
    pub fn validate(&self) -> KeywardResult<()> {
        let token = &self.auth.token;
        if token.codec != CODEC_JWT && token.codec != CODEC_HEADLESS_JWT {
            return Err(KeywardError::invalid_configuration(format!(
                "invalid token codec '{}' (valid types: {}, {})",
                token.codec, CODEC_JWT, CODEC_HEADLESS_JWT
            )));
        }

        if token.keys.is_empty() {
            return Err(KeywardError::invalid_configuration(
                "no verification keys are configured",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.auth.token.codec, CODEC_HEADLESS_JWT);
        assert_eq!(settings.auth.token.algorithm, "HS256");
        assert_eq!(settings.auth.token.keys.len(), 1);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[auth.token]
codec = "jwt"
keys = ["first-secret", "second-secret"]
"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.auth.token.codec, "jwt");
        assert_eq!(settings.auth.token.issuer, "keyward");
        assert_eq!(settings.auth.token.keys, vec!["first-secret", "second-secret"]);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("KEYWARD_PORT", "3000"),
            ("KEYWARD_TOKEN_CODEC", "jwt"),
            ("KEYWARD_TOKEN_KEYS", "new-key; old-key ;"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.auth.token.codec, "jwt");
        assert_eq!(settings.auth.token.keys, vec!["new-key", "old-key"]);
    }

    #[test]
    fn test_bad_port_override_is_rejected() {
        let mut settings = Settings::default();
        let result = settings.apply_env(|name| (name == "KEYWARD_PORT").then(|| "http".to_string()));
        assert!(matches!(
            result,
            Err(KeywardError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_unknown_codec_is_rejected() {
        let mut settings = Settings::default();
        settings.auth.token.codec = "paseto".to_string();
        assert!(matches!(
            settings.validate(),
            Err(KeywardError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_missing_keys_rejected() {
        let mut settings = Settings::default();
        settings.auth.token.keys.clear();
        assert!(settings.validate().is_err());

        settings.auth.enabled = false;
        assert!(settings.validate().is_err());
    }
}
