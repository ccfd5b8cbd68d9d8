//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs issued by the identity service with the shared
//! secret. The `sub` claim carries the user's UUID.
//!
//! ```rust,ignore
//! async fn balance(State(state): State<AppState>, AuthUser(me): AuthUser) -> ... {
//!     // `me` is the verified caller
//! }
//! ```

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Query},
    http::request::Parts,
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use timebank_core::ids::UserId;

/// Registered claims the API relies on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Expiry (seconds since the epoch).
    pub exp: i64,
    /// Issue time (seconds since the epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// HS256 signing and verification keys derived from the shared secret.
#[derive(Clone)]
pub struct JwtKeys {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtKeys {
    /// Builds keys from the shared secret.
    #[must_use]
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verifies a token and returns the user it was issued to.
    ///
    /// # Errors
    ///
    /// Returns 401 for a bad signature, an expired token or a `sub` that is
    /// not a UUID.
    pub fn verify(&self, token: &str) -> Result<UserId, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::unauthorized("Invalid or expired token")
        })?;
        data.claims
            .sub
            .parse()
            .map_err(|_| AppError::unauthorized("Invalid token subject"))
    }

    /// Signs a token for `user` valid until `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if signing fails.
    pub fn issue(
        &self,
        user: UserId,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let claims = Claims {
            sub: user.to_string(),
            exp: expires_at.timestamp(),
            iat: Some(issued_at.timestamp()),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::internal("Failed to sign token").with_source(e.into()))
    }
}

/// Raw bearer token from `Authorization: Bearer <token>`, or from the
/// `token` query parameter (browsers cannot set headers on a WebSocket
/// handshake).
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(header) = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
        {
            let token = header.strip_prefix("Bearer ").ok_or_else(|| {
                AppError::unauthorized("Invalid authorization format. Expected 'Bearer <token>'")
            })?;
            if token.is_empty() {
                return Err(AppError::unauthorized("Empty bearer token"));
            }
            return Ok(Self(token.to_string()));
        }

        Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token)
            .filter(|t| !t.is_empty())
            .map(Self)
            .ok_or_else(|| AppError::unauthorized("Missing authorization header"))
    }
}

/// The verified caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let user = JwtKeys::from_ref(state).verify(&token)?;
        Ok(Self(user))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use chrono::Duration;

    fn keys() -> JwtKeys {
        JwtKeys::from_secret(b"test-secret-with-enough-entropy!")
    }

    #[test]
    fn issued_tokens_verify() {
        let user = UserId::new();
        let now = Utc::now();
        let token = keys().issue(user, now, now + Duration::hours(1)).unwrap();
        assert_eq!(keys().verify(&token).unwrap(), user);
    }

    #[test]
    fn expired_and_foreign_tokens_are_rejected() {
        let user = UserId::new();
        let now = Utc::now();
        let expired = keys()
            .issue(user, now - Duration::hours(3), now - Duration::hours(2))
            .unwrap();
        assert_eq!(keys().verify(&expired).unwrap_err().status(), StatusCode::UNAUTHORIZED);

        let foreign = JwtKeys::from_secret(b"another-secret-entirely-123456789")
            .issue(user, now, now + Duration::hours(1))
            .unwrap();
        assert!(keys().verify(&foreign).is_err());
    }

    #[tokio::test]
    async fn bearer_token_falls_back_to_query() {
        let request = Request::builder().uri("/ws?token=abc").body(()).unwrap();
        let (mut parts, ()) = request.into_parts();
        let BearerToken(token) = BearerToken::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(token, "abc");

        let request = Request::builder()
            .uri("/ws")
            .header("authorization", "Basic xyz")
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();
        assert!(BearerToken::from_request_parts(&mut parts, &()).await.is_err());
    }
}
