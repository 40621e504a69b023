use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::services::{Clock, ServiceError};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Signs and validates HS256 bearer tokens.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_lifetime: Duration,
    clock: Arc<dyn Clock>,
}

/// Bearer token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user email)
    pub sub: String,
    /// User ID
    pub uid: Uuid,
    /// Session ID, unique per issued token
    pub sid: Uuid,
    /// JWT ID, same value as `sid`
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// A freshly signed token with its metadata.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub session_id: Uuid,
    pub expires_at: DateTime<Utc>,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Deserialize)]
struct RawHeader {
    alg: Option<String>,
}

impl JwtService {
    pub fn new(config: &JwtConfig, clock: Arc<dyn Clock>) -> Result<Self, ServiceError> {
        let secret = config.secret.expose_secret();
        if secret.is_empty() {
            return Err(ServiceError::Config("JWT secret must not be empty".to_string()));
        }
        if config.token_expiry_hours <= 0 {
            return Err(ServiceError::Config(
                "JWT token lifetime must be positive".to_string(),
            ));
        }

        tracing::info!(
            expiry_hours = config.token_expiry_hours,
            "JWT service initialized with HS256 key"
        );

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_lifetime: Duration::hours(config.token_expiry_hours),
            clock,
        })
    }

    pub fn issue_token(&self, subject: &str, user_id: Uuid) -> Result<IssuedToken, ServiceError> {
        let now = self.clock.now();
        let expires_at = now + self.token_lifetime;
        let session_id = Uuid::new_v4();

        let claims = TokenClaims {
            sub: subject.to_string(),
            uid: user_id,
            sid: session_id,
            jti: session_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            session_id,
            expires_at,
            expires_in: self.token_lifetime.num_seconds(),
        })
    }

    /// Validate signature, algorithm and expiry of `raw`.
    pub fn validate_token(&self, raw: &str) -> Result<TokenClaims, ServiceError> {
        // Anything other than HS256 in the header, including "none", is
        // treated as a forged signature rather than a decoding problem.
        match header_algorithm(raw)? {
            Some(alg) if alg == "HS256" => {}
            _ => return Err(ServiceError::InvalidSignature),
        }

        let mut validation = Validation::new(ALGORITHM);
        // Expiry is decided against the injected clock below.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<TokenClaims>(raw, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    ServiceError::InvalidSignature
                }
                ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
                _ => ServiceError::MalformedToken,
            }
        })?;

        if data.claims.exp <= self.clock.now().timestamp() {
            return Err(ServiceError::TokenExpired);
        }

        Ok(data.claims)
    }
}

fn header_algorithm(raw: &str) -> Result<Option<String>, ServiceError> {
    let mut parts = raw.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ServiceError::MalformedToken);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|_| ServiceError::MalformedToken)?;
    let header: RawHeader =
        serde_json::from_slice(&bytes).map_err(|_| ServiceError::MalformedToken)?;

    Ok(header.alg)
}
