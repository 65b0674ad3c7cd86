//! JWT access and refresh tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

pub const ACCESS_SCOPE: &str = "access_token";
pub const REFRESH_SCOPE: &str = "refresh_token";

/// Claims carried by both token kinds; `scope` tells them apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User email
    pub sub: String,
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token so that two tokens minted in the same second differ
    pub jti: String,
}

/// Signs and verifies HS256 tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn create_access_token(&self, email: &str) -> Result<String, AppError> {
        self.sign(email, ACCESS_SCOPE, self.access_ttl)
    }

    pub fn create_refresh_token(&self, email: &str) -> Result<String, AppError> {
        self.sign(email, REFRESH_SCOPE, self.refresh_ttl)
    }

    /// Verify an access token and return the email it was issued to.
    pub fn decode_access_token(&self, token: &str) -> Result<String, AppError> {
        self.verify(token, ACCESS_SCOPE)
    }

    /// Verify a refresh token and return the email it was issued to.
    pub fn decode_refresh_token(&self, token: &str) -> Result<String, AppError> {
        self.verify(token, REFRESH_SCOPE)
    }

    fn sign(&self, email: &str, scope: &str, ttl: Duration) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: email.to_string(),
            scope: scope.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            tracing::error!("Failed to sign token: {:?}", e);
            AppError::Internal("Failed to sign token".to_string())
        })
    }

    fn verify(&self, token: &str, scope: &str) -> Result<String, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))?;
        if data.claims.scope != scope {
            return Err(AppError::Unauthorized("Invalid scope for token".to_string()));
        }
        Ok(data.claims.sub)
    }
}
