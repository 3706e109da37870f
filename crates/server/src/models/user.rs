//! Users, carried only for identity resolution.
//!
//! Account management is out of scope; a user row exists so the bearer-token
//! middleware has something to resolve authenticated requests against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zentro_core::UserId;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    /// Opaque bearer token issued out-of-band.
    pub api_token: String,
}
