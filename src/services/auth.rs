use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

/// HS256 token issuer/verifier for the single configured operator account.
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    username: String,
    password: String,
    expire: Duration,
}

impl AuthService {
    pub fn new(secret: &str, username: &str, password: &str, expire_mins: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            username: username.to_string(),
            password: password.to_string(),
            expire: Duration::minutes(expire_mins),
        }
    }

    /// Build from configuration. `Ok(None)` when no secret is configured.
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>, AuthError> {
        let Some(secret) = config.auth_secret.as_deref() else {
            return Ok(None);
        };
        let (Some(username), Some(password)) =
            (config.auth_username.as_deref(), config.auth_password.as_deref())
        else {
            return Err(AuthError::MissingCredentials);
        };

        Ok(Some(Self::new(secret, username, password, config.token_expire_mins)))
    }

    /// Check the credentials and issue a token for them.
    pub fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        if username != self.username || password != self.password {
            return Err(AuthError::InvalidCredentials);
        }
        self.issue(username)
    }

    pub fn issue(&self, subject: &str) -> Result<String, AuthError> {
        let claims = Claims {
            sub: subject.to_string(),
            exp: (Utc::now() + self.expire).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verify a token, returning its subject.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims.sub)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("AUTH_USERNAME and AUTH_PASSWORD must be set when AUTH_SECRET is")]
    MissingCredentials,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}
