/**
 * Authentication contract
 * Tokens are issued elsewhere; this module only verifies bearer JWTs and
 * turns their claims into the acting user.
 */
use axum::http::HeaderMap;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

lazy_static::lazy_static! {
    /// JWT secret key from environment
    pub static ref JWT_SECRET: String = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string());
}

/// True when JWT_SECRET is unset, blank or the shipped default.
pub fn uses_default_secret() -> bool {
    let secret = JWT_SECRET.trim();
    secret.is_empty() || secret == DEFAULT_JWT_SECRET
}

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,   // User ID
    pub email: String, // User email
    pub role: String,  // User role
    pub exp: i64,      // Expiry timestamp
    pub iat: i64,      // Issued at timestamp
}

/// The authenticated caller of a write operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: String,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }

    /// Owner-or-admin rule applied to post mutations.
    pub fn ensure_can_modify(&self, owner_id: Uuid) -> Result<()> {
        if self.user_id == owner_id || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Only the post owner or an admin can modify this post".to_string(),
            ))
        }
    }
}

impl TryFrom<Claims> for Actor {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid token subject".to_string()))?;
        Ok(Self {
            user_id,
            role: claims.role,
        })
    }
}

/// Verify and decode access token
pub fn verify_access_token(token: &str) -> std::result::Result<Claims, jsonwebtoken::errors::Error> {
    verify_with_secret(token, JWT_SECRET.as_bytes())
}

fn verify_with_secret(
    token: &str,
    secret: &[u8],
) -> std::result::Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve the acting user from the request headers.
pub fn authenticate(headers: &HeaderMap) -> Result<Actor> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Authorization required".to_string()))?;

    let claims = verify_access_token(token)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    Actor::try_from(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(sub: &str, role: &str) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            email: "author@example.com".to_string(),
            role: role.to_string(),
            exp: (now + Duration::minutes(15)).timestamp(),
            iat: now.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_verify_access_token_invalid_returns_err() {
        assert!(verify_access_token("invalid.jwt.token").is_err());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = token_for(&Uuid::new_v4().to_string(), "author");
        assert!(verify_with_secret(&token, b"another-secret").is_err());
    }

    #[test]
    fn test_authenticate_missing_header() {
        let err = authenticate(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_authenticate_valid_token() {
        let user_id = Uuid::new_v4();
        let actor = authenticate(&bearer(&token_for(&user_id.to_string(), "author"))).unwrap();
        assert_eq!(actor.user_id, user_id);
        assert!(!actor.is_admin());
    }

    #[test]
    fn test_non_uuid_subject_is_unauthorized() {
        let err = authenticate(&bearer(&token_for("42", "author"))).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_owner_or_admin_may_modify() {
        let owner = Uuid::new_v4();
        let author = Actor {
            user_id: owner,
            role: "author".into(),
        };
        let stranger = Actor {
            user_id: Uuid::new_v4(),
            role: "author".into(),
        };
        let admin = Actor {
            user_id: Uuid::new_v4(),
            role: "ADMIN".into(),
        };
        assert!(author.ensure_can_modify(owner).is_ok());
        assert!(admin.ensure_can_modify(owner).is_ok());
        assert!(matches!(
            stranger.ensure_can_modify(owner),
            Err(AppError::Forbidden(_))
        ));
    }
}
