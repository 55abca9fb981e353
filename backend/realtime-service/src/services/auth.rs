use crate::error::AppError;
use actix_web::{http::header, HttpRequest};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims carried by SkillBarter access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Verify an HS256 bearer token and return its claims.
///
/// Signature and expiry failures both surface as `TokenInvalid`; the
/// handshake is rejected either way and never retried.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    if token.is_empty() {
        return Err(AppError::TokenMissing);
    }

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::TokenInvalid(e.to_string()))
}

/// Extract a bearer token from the Authorization header, if present
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    pub(crate) fn issue_token(sub: &str, expires_in_seconds: i64, secret: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            iat: now,
            exp: now + expires_in_seconds,
            email: None,
            username: Some("tester".to_string()),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_round_trips() {
        let user_id = Uuid::new_v4();
        let token = issue_token(&user_id.to_string(), 3600, "test-secret");

        let claims = verify_token(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.username.as_deref(), Some("tester"));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_token("user-1", -3600, "test-secret");
        assert!(matches!(
            verify_token(&token, "test-secret"),
            Err(AppError::TokenInvalid(_))
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token("user-1", 3600, "test-secret");
        assert!(matches!(
            verify_token(&token, "other-secret"),
            Err(AppError::TokenInvalid(_))
        ));
    }

    #[test]
    fn test_empty_token_is_missing() {
        assert!(matches!(verify_token("", "test-secret"), Err(AppError::TokenMissing)));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(matches!(
            verify_token("not.a.token", "test-secret"),
            Err(AppError::TokenInvalid(_))
        ));
    }
}
