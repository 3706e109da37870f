//! Owner keys: the identity a cart or shipping profile is scoped to.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::UserId;

/// The request carried neither an authenticated user nor a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no authenticated user and no session token")]
pub struct MissingIdentity;

/// The identity a cart or shipping profile belongs to.
///
/// Exactly one of the two variants applies to any request: an authenticated
/// user is always keyed by their user id with no session component, while an
/// anonymous visitor is keyed by a caller-supplied session token. Equality is
/// identity for the purpose of locating owned records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKey {
    /// A signed-in user.
    Authenticated(UserId),
    /// An anonymous visitor, keyed by their session token.
    Anonymous(String),
}

impl OwnerKey {
    /// Resolve an owner key from the two identity channels a request can carry.
    ///
    /// An authenticated user always wins; the session token is only consulted
    /// for anonymous requests.
    ///
    /// # Errors
    ///
    /// Returns [`MissingIdentity`] when neither channel is populated.
    pub fn resolve(
        user: Option<UserId>,
        session_token: Option<&str>,
    ) -> Result<Self, MissingIdentity> {
        if let Some(user_id) = user {
            return Ok(Self::Authenticated(user_id));
        }
        match session_token {
            Some(token) if !token.is_empty() => Ok(Self::Anonymous(token.to_owned())),
            _ => Err(MissingIdentity),
        }
    }

    /// The user id, when authenticated.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Authenticated(id) => Some(*id),
            Self::Anonymous(_) => None,
        }
    }

    /// The session token, when anonymous.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        match self {
            Self::Authenticated(_) => None,
            Self::Anonymous(token) => Some(token.as_str()),
        }
    }
}

impl std::fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authenticated(id) => write!(f, "user:{id}"),
            Self::Anonymous(token) => write!(f, "session:{token}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_wins_over_session_token() {
        let owner = OwnerKey::resolve(Some(UserId::new(7)), Some("s1")).unwrap();
        assert_eq!(owner, OwnerKey::Authenticated(UserId::new(7)));
    }

    #[test]
    fn anonymous_requires_session_token() {
        let owner = OwnerKey::resolve(None, Some("s1")).unwrap();
        assert_eq!(owner, OwnerKey::Anonymous("s1".to_owned()));

        assert_eq!(OwnerKey::resolve(None, None), Err(MissingIdentity));
        assert_eq!(OwnerKey::resolve(None, Some("")), Err(MissingIdentity));
    }
}
