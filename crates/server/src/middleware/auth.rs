//! Authentication extractor.
//!
//! Identity is a bearer-token lookup: `Authorization: Bearer <token>`
//! resolves to a user through the store. Account management and token
//! issuance are out of scope — tokens are provisioned out-of-band.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use zentro_core::UserId;

use crate::error::AppError;
use crate::state::AppState;

/// The authenticated user attached to a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
}

/// Extractor that optionally authenticates the request.
///
/// A missing `Authorization` header yields `None` (the request proceeds
/// anonymously, keyed by its session token); a present-but-invalid token is
/// rejected rather than silently downgraded to anonymous.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(OptionalAuth(user): OptionalAuth) -> impl IntoResponse {
///     match user {
///         Some(u) => format!("hello, {}", u.email),
///         None => "hello, guest".to_string(),
///     }
/// }
/// ```
pub struct OptionalAuth(pub Option<AuthUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Self(None));
        };

        let value = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("malformed authorization header".to_owned()))?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("malformed authorization header".to_owned()))?;

        match state.store().find_user_by_token(token).await? {
            Some(user) => Ok(Self(Some(AuthUser {
                id: user.id,
                email: user.email,
            }))),
            None => Err(AppError::Unauthorized("invalid token".to_owned())),
        }
    }
}
