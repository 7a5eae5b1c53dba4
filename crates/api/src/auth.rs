//! Authenticated principal.
//!
//! Authentication happens upstream at the gateway, which forwards the
//! verified user in `x-user-id` and, for operators, `x-user-role: admin`.

use axum::extract::{FromRequestParts, Request};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use common::UserId;

use crate::error::ApiError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the authenticated user's role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The user a request acts on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Principal {
    /// Reads the principal from gateway headers, if present and well formed.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let user_id = headers
            .get(USER_ID_HEADER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)?;
        let is_admin = headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));

        Some(Self {
            user_id: UserId::new(user_id),
            is_admin,
        })
    }

    /// Fails with `Forbidden` unless the principal is an operator.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Middleware that attaches the [`Principal`] to the request extensions.
pub async fn authenticate(mut req: Request, next: Next) -> Response {
    if let Some(principal) = Principal::from_headers(req.headers()) {
        req.extensions_mut().insert(principal);
    }
    next.run(req).await
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .copied()
            .ok_or(ApiError::Unauthorized)
    }
}
