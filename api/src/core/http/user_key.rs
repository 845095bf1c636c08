use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use game_store::ANONYMOUS_USER;

pub const USER_HEADER: &str = "X-User-Id";

/// Opaque owner of save slots, taken from `X-User-Id`. Missing or blank means anonymous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserKey(pub String);

impl<S> FromRequestParts<S> for UserKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(ANONYMOUS_USER);
        Ok(UserKey(key.to_string()))
    }
}
