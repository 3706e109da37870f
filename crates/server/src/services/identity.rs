//! Identity resolution.
//!
//! Every cart, shipping, checkout, and order operation starts here: an
//! inbound request carries an authenticated user (resolved by the bearer
//! token middleware), an anonymous session token, or nothing, and the rest
//! of the system only ever sees the resulting [`OwnerKey`].

use zentro_core::{OwnerKey, UserId};

use crate::error::AppError;

/// Resolve the request's owner key. No side effects.
///
/// # Errors
///
/// Returns [`AppError::MissingIdentity`] when the request carries neither an
/// authenticated user nor a session token.
pub fn resolve_owner(
    user: Option<UserId>,
    session_token: Option<&str>,
) -> Result<OwnerKey, AppError> {
    Ok(OwnerKey::resolve(user, session_token)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticated_user_is_pinned_without_session() {
        let owner = resolve_owner(Some(UserId::new(3)), Some("sess")).unwrap();
        assert_eq!(owner.user_id(), Some(UserId::new(3)));
        assert_eq!(owner.session_token(), None);
    }

    #[test]
    fn no_identity_is_a_client_error() {
        assert!(matches!(
            resolve_owner(None, None),
            Err(AppError::MissingIdentity)
        ));
    }
}
