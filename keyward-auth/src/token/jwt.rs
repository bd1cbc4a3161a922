//! JWT and headless JWT codecs built on `jsonwebtoken`

use super::{Key, Token, TokenCodec};
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use keyward_core::{
    settings::{CODEC_HEADLESS_JWT, CODEC_JWT},
    KeywardError, KeywardResult,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::HashSet, fmt, str::FromStr, sync::Arc, time::Duration};
use tracing::debug;

/// Source of "now" for issuing and expiry checks
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Registered claims carried by keyward tokens
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default, deserialize_with = "one_or_many")]
    aud: Vec<String>,
    iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,
}

/// `aud` may be a single string or an array
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(audience) => vec![audience],
        OneOrMany::Many(audiences) => audiences,
    })
}

/// Standard three-segment JWT codec
#[derive(Clone)]
pub struct JwtCodec {
    algorithm: Algorithm,
    issuer: Option<String>,
    ttl: Option<Duration>,
    not_before: bool,
    clock: Clock,
    validation: Validation,
}

impl JwtCodec {
    /// Create a codec for a JWS algorithm name such as `HS256` or `EdDSA`.
    ///
    /// Tokens expire after 24 hours unless [`JwtCodec::with_ttl`] says otherwise.
    pub fn new(algorithm: &str) -> KeywardResult<Self> {
        let algorithm = Algorithm::from_str(algorithm).map_err(|_| {
            KeywardError::invalid_configuration(format!(
                "unsupported signature algorithm '{}'",
                algorithm
            ))
        })?;

        // exp/nbf are checked against our own clock after signature verification
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        Ok(Self {
            algorithm,
            issuer: None,
            ttl: Some(Duration::from_secs(24 * 60 * 60)),
            not_before: false,
            clock: Arc::new(Utc::now),
            validation,
        })
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();
        self.validation.set_issuer(&[issuer.as_str()]);
        self.issuer = Some(issuer);
        self
    }

    /// Require this audience when decoding
    pub fn with_audience(mut self, audience: impl AsRef<str>) -> Self {
        self.validation.set_audience(&[audience.as_ref()]);
        self.validation.validate_aud = true;
        self
    }

    /// `None` issues tokens without an expiry
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_not_before(mut self) -> Self {
        self.not_before = true;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn encoding_key(&self, key: &Key) -> jsonwebtoken::errors::Result<EncodingKey> {
        let material = key.private();
        match self.algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                Ok(EncodingKey::from_secret(material))
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => EncodingKey::from_rsa_pem(material),
            Algorithm::ES256 | Algorithm::ES384 => EncodingKey::from_ec_pem(material),
            Algorithm::EdDSA => EncodingKey::from_ed_pem(material),
        }
    }

    fn decoding_key(&self, key: &Key) -> jsonwebtoken::errors::Result<DecodingKey> {
        let material = key.public();
        match self.algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                Ok(DecodingKey::from_secret(material))
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(material),
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(material),
            Algorithm::EdDSA => DecodingKey::from_ed_pem(material),
        }
    }

    fn sign(&self, key: &Key, subject: &str, audiences: &[&str]) -> KeywardResult<String> {
        let now = (self.clock)().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            aud: audiences.iter().map(|a| a.to_string()).collect(),
            iat: now,
            exp: self
                .ttl
                .map(|ttl| now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))),
            nbf: self.not_before.then_some(now),
            iss: self.issuer.clone(),
        };

        let encoding_key = self.encoding_key(key).map_err(|e| {
            KeywardError::invalid_configuration(format!("unusable signing key: {}", e))
        })?;

        jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &encoding_key).map_err(|e| {
            KeywardError::invalid_configuration(format!("failed to sign token: {}", e))
        })
    }

    fn verify(&self, key: &Key, token: &str) -> KeywardResult<Token> {
        let decoding_key = self.decoding_key(key).map_err(|e| {
            KeywardError::invalid_token(format!("unusable verification key: {}", e))
        })?;

        let claims = jsonwebtoken::decode::<Claims>(token, &decoding_key, &self.validation)
            .map_err(|e| {
                debug!(stage = "decode", error = %e, "Token rejected");
                KeywardError::invalid_token(e.to_string())
            })?
            .claims;

        let now = (self.clock)().timestamp();
        if claims.exp.is_some_and(|exp| now >= exp) {
            return Err(KeywardError::invalid_token("token has expired"));
        }
        if claims.nbf.is_some_and(|nbf| now < nbf) {
            return Err(KeywardError::invalid_token("token is not valid yet"));
        }

        Ok(Token {
            issuer: claims.iss,
            subject: claims.sub,
            audience: claims.aud,
            expires_at: claims.exp.and_then(|exp| DateTime::from_timestamp(exp, 0)),
            issued_at: DateTime::from_timestamp(claims.iat, 0)
                .ok_or_else(|| KeywardError::invalid_token("issued-at out of range"))?,
        })
    }
}

impl fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtCodec")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .field("not_before", &self.not_before)
            .finish_non_exhaustive()
    }
}

impl TokenCodec for JwtCodec {
    fn name(&self) -> &'static str {
        CODEC_JWT
    }

    fn encode(&self, key: &Key, subject: &str, audiences: &[&str]) -> KeywardResult<Vec<u8>> {
        self.sign(key, subject, audiences).map(String::into_bytes)
    }

    fn decode(&self, key: &Key, token: &[u8]) -> KeywardResult<Token> {
        let token = std::str::from_utf8(token)
            .map_err(|_| KeywardError::invalid_token("token is not valid UTF-8"))?;
        self.verify(key, token)
    }
}

/// JWT codec whose wire form omits the header segment.
///
/// The header only depends on the algorithm, so it is computed once and put
/// back in front of the payload before verification.
#[derive(Debug, Clone)]
pub struct HeadlessJwtCodec {
    inner: JwtCodec,
    header: String,
}

impl HeadlessJwtCodec {
    pub fn new(inner: JwtCodec) -> KeywardResult<Self> {
        let header = serde_json::to_vec(&Header::new(inner.algorithm()))?;
        Ok(Self {
            header: BASE64_URL_SAFE_NO_PAD.encode(header),
            inner,
        })
    }

    /// Encoded header segment that is stripped from the wire
    pub fn header(&self) -> &str {
        &self.header
    }
}

impl TokenCodec for HeadlessJwtCodec {
    fn name(&self) -> &'static str {
        CODEC_HEADLESS_JWT
    }

    fn encode(&self, key: &Key, subject: &str, audiences: &[&str]) -> KeywardResult<Vec<u8>> {
        let signed = self.inner.sign(key, subject, audiences)?;
        match signed.split_once('.') {
            Some((_, rest)) if rest.split('.').count() == 2 => Ok(rest.as_bytes().to_vec()),
            _ => Err(KeywardError::invalid_token("signed token is not a compact JWS")),
        }
    }

    fn decode(&self, key: &Key, token: &[u8]) -> KeywardResult<Token> {
        let payload = std::str::from_utf8(token)
            .map_err(|_| KeywardError::invalid_token("token is not valid UTF-8"))?;
        let full = format!("{}.{}", self.header, payload);
        if full.split('.').count() != 3 {
            return Err(KeywardError::invalid_token(
                "headless token must have exactly two segments",
            ));
        }
        self.inner.verify(key, &full)
    }
}
