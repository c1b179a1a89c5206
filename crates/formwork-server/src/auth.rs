// formwork-server/src/auth.rs
// ============================================================================
// Module: Token Authentication
// Description: Bearer-token authenticator backed by configured users.
// Purpose: Resolve request tokens to users without timing side-channels.
// Dependencies: formwork-core, subtle
// ============================================================================

//! ## Overview
//! [`TokenAuthenticator`] compares a presented token against every configured
//! token in constant time and returns the owning user.

use formwork_core::Authenticator;
use formwork_core::User;
use subtle::ConstantTimeEq;

// ============================================================================
// SECTION: Constant-Time Comparisons
// ============================================================================

/// Compares two strings in constant time.
#[must_use]
pub fn constant_time_eq_str(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

// ============================================================================
// SECTION: Authenticator
// ============================================================================

/// Authenticator over a fixed token table.
pub struct TokenAuthenticator {
    /// `(token, user)` pairs.
    users: Vec<(String, User)>,
}

impl TokenAuthenticator {
    /// Creates an authenticator from `(token, user)` pairs.
    #[must_use]
    pub const fn new(users: Vec<(String, User)>) -> Self {
        Self {
            users,
        }
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, token: &str) -> Option<User> {
        let mut found = None;
        for (candidate, user) in &self.users {
            if constant_time_eq_str(candidate, token) && found.is_none() {
                found = Some(user.clone());
            }
        }
        found
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use formwork_core::RoleName;
    use formwork_core::UserId;

    use super::*;

    #[test]
    fn tokens_resolve_to_their_users() {
        let user = User {
            id: UserId::new("1"),
            login: "admin".to_string(),
            roles: vec![RoleName::new(RoleName::ADMINISTRATOR)],
        };
        let auth = TokenAuthenticator::new(vec![("secret".to_string(), user)]);
        assert_eq!(auth.authenticate("secret").unwrap().login, "admin");
        assert!(auth.authenticate("secre").is_none());
        assert!(auth.authenticate("").is_none());
    }
}
