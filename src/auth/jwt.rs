//! JWT token handling for user authentication
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256)
//! - Default expiry is 1 hour; refresh tokens last 7 days
//! - In production, JWT_SECRET must be a strong random value from environment

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::UltimaError;

/// Payload stored in a JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User document id (ObjectId hex)
    pub user_id: String,
    /// User identifier (email/username)
    pub identifier: String,
    /// Token version (incremented to invalidate all outstanding tokens)
    pub version: i32,
    /// Whether this is a refresh token
    #[serde(default)]
    pub refresh: bool,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub user_id: String,
    pub identifier: String,
    pub token_version: i32,
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short.
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, UltimaError> {
        if secret.is_empty() {
            return Err(UltimaError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(UltimaError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Create a validator for dev mode
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: 3600,
        }
    }

    fn now() -> Result<u64, UltimaError> {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .map_err(|e| UltimaError::Auth(format!("System time error: {}", e)))
    }

    fn sign(&self, claims: &Claims) -> Result<String, UltimaError> {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| UltimaError::Auth(format!("Failed to generate token: {}", e)))
    }

    /// Generate an access token for an authenticated user
    pub fn generate_token(&self, input: &TokenInput) -> Result<String, UltimaError> {
        let now = Self::now()?;
        self.sign(&Claims {
            user_id: input.user_id.clone(),
            identifier: input.identifier.clone(),
            version: input.token_version,
            refresh: false,
            iat: now,
            exp: now + self.expiry_seconds,
        })
    }

    /// Generate a refresh token with longer expiry (7 days)
    pub fn generate_refresh_token(&self, input: &TokenInput) -> Result<String, UltimaError> {
        let now = Self::now()?;
        self.sign(&Claims {
            user_id: input.user_id.clone(),
            identifier: input.identifier.clone(),
            version: input.token_version,
            refresh: true,
            iat: now,
            exp: now + 7 * 24 * 60 * 60,
        })
    }

    /// Validate a token and return its claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, UltimaError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| UltimaError::Unauthorized(format!("Invalid token: {}", e)))?;

        Ok(data.claims)
    }
}

/// Extract a bearer token from an Authorization header value
pub fn extract_token_from_header(header: &str) -> Option<&str> {
    header.strip_prefix("Bearer ").filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> JwtValidator {
        JwtValidator::new_dev()
    }

    fn input() -> TokenInput {
        TokenInput {
            user_id: "64b0c0ffee0ddba11ca11ab1".into(),
            identifier: "alice@example.com".into(),
            token_version: 1,
        }
    }

    #[test]
    fn test_generate_and_validate() {
        let v = validator();
        let token = v.generate_token(&input()).unwrap();
        let claims = v.validate_token(&token).unwrap();

        assert_eq!(claims.user_id, "64b0c0ffee0ddba11ca11ab1");
        assert_eq!(claims.identifier, "alice@example.com");
        assert!(!claims.refresh);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_refresh_token_flag() {
        let v = validator();
        let token = v.generate_refresh_token(&input()).unwrap();
        let claims = v.validate_token(&token).unwrap();

        assert!(claims.refresh);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let v = validator();
        let token = v.generate_token(&input()).unwrap();

        let other =
            JwtValidator::new("another-secret-that-is-long-enough-000000".into(), 3600).unwrap();
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(JwtValidator::new("short".into(), 3600).is_err());
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token_from_header("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_token_from_header("Basic abc123"), None);
        assert_eq!(extract_token_from_header("Bearer "), None);
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(validator().validate_token("not.a.token").is_err());
    }
}
