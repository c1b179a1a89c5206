// formwork-core/src/core/uid.rs
// ============================================================================
// Module: Formwork View Uids
// Description: Generation and validation of view instance identifiers.
// Purpose: Give every rendered view a DOM-safe identifier.
// Dependencies: rand, serde, thiserror, time
// ============================================================================

//! ## Overview
//! Each rendered view receives a uid that templates use as a DOM id prefix.
//! A client may pass its own uid; otherwise one is derived from the
//! controller name, the current second, and a random suffix. Either way the
//! result is camel-cased at `-`, `/` and `\` boundaries and restricted to
//! `[A-Za-z0-9-_]`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Uid validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UidError {
    /// Uid contains characters outside `[A-Za-z0-9-_]`.
    #[error("Invalid UID: {0}")]
    InvalidUid(String),
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// View instance identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    /// Generates or adopts a uid for a controller.
    ///
    /// # Errors
    ///
    /// Returns [`UidError::InvalidUid`] when the resulting uid is not DOM-safe.
    pub fn generate(controller: &str, given: Option<&str>) -> Result<Self, UidError> {
        let seed = match given {
            Some(given) if !given.is_empty() => given.to_string(),
            _ => {
                let seconds = OffsetDateTime::now_utc().unix_timestamp();
                let suffix: u16 = rand::thread_rng().gen_range(1000 ..= 9999);
                format!("{controller}_{seconds}_{suffix}")
            }
        };
        Self::check(&camelize(&seed))
    }

    /// Validates an existing uid.
    ///
    /// # Errors
    ///
    /// Returns [`UidError::InvalidUid`] for empty or unsafe input.
    pub fn check(uid: &str) -> Result<Self, UidError> {
        let valid = !uid.is_empty()
            && uid.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if valid { Ok(Self(uid.to_string())) } else { Err(UidError::InvalidUid(uid.to_string())) }
    }

    /// Returns the uid as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Removes `-`, `/`, `\` and uppercases the character that follows.
fn camelize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut upper_next = false;
    for ch in input.chars() {
        if matches!(ch, '-' | '/' | '\\') {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn generated_uid_camelizes_controller_path() {
        let uid = Uid::generate("Crm/Customers", None).unwrap();
        assert!(uid.as_str().starts_with("CrmCustomers_"));
        let parts: Vec<&str> = uid.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[2].len(), 4);
    }

    #[test]
    fn given_uid_is_used_and_camelized() {
        assert_eq!(Uid::generate("X", Some("my-view")).unwrap().as_str(), "myView");
        assert_eq!(Uid::generate("X", Some("a\\b")).unwrap().as_str(), "aB");
    }

    #[test]
    fn unsafe_uids_are_rejected() {
        assert_eq!(Uid::check("bad uid"), Err(UidError::InvalidUid("bad uid".to_string())));
        assert!(Uid::generate("X", Some("<script>")).is_err());
        assert!(Uid::check("").is_err());
    }

    proptest! {
        #[test]
        fn generated_uids_are_dom_safe(controller in "[A-Za-z][A-Za-z0-9/-]{0,20}") {
            let uid = Uid::generate(&controller, None).unwrap();
            prop_assert!(uid.as_str().chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_'));
        }
    }
}
