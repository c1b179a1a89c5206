// formwork-core/src/core/permissions.rs
// ============================================================================
// Module: Formwork Permissions
// Description: Users, record permissions, and role-based permission policy.
// Purpose: Decide whether a user may run a controller or touch a model.
// Dependencies: crate::core::identifiers, serde, thiserror
// ============================================================================

//! ## Overview
//! Permissions are plain strings. Record permissions take the form
//! `Model:Action` (`Crm/Customer:Update`); controller permissions default to
//! the controller name. A [`PermissionPolicy`] grants patterns to roles:
//! exact strings, prefix wildcards ending in `*`, or a bare `*`. The
//! administrator role is granted everything regardless of the policy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ModelName;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::UserId;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Permission check failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    /// User lacks the permission.
    #[error("Not enough permissions ({0}).")]
    NotEnoughPermissions(String),
}

// ============================================================================
// SECTION: Users
// ============================================================================

/// Authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Login name shown in views.
    pub login: String,
    /// Granted roles.
    #[serde(default)]
    pub roles: Vec<RoleName>,
}

impl User {
    /// Returns true when the user holds the administrator role.
    #[must_use]
    pub fn is_administrator(&self) -> bool {
        self.roles.iter().any(RoleName::is_administrator)
    }
}

// ============================================================================
// SECTION: Record Permissions
// ============================================================================

/// Record-level action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordAction {
    /// Read records.
    Read,
    /// Insert records.
    Create,
    /// Modify records.
    Update,
    /// Remove records.
    Delete,
}

impl RecordAction {
    /// Returns the action label used in permission strings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

impl fmt::Display for RecordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the permission string for a record action.
#[must_use]
pub fn record_permission(model: &ModelName, action: RecordAction) -> String {
    format!("{model}:{action}")
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Role to permission-pattern mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionPolicy {
    /// Granted patterns per role.
    roles: BTreeMap<String, Vec<String>>,
}

impl PermissionPolicy {
    /// Creates a policy from role grants.
    #[must_use]
    pub const fn new(roles: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            roles,
        }
    }

    /// Grants a pattern to a role.
    #[must_use]
    pub fn grant(mut self, role: &str, pattern: &str) -> Self {
        self.roles.entry(role.to_string()).or_default().push(pattern.to_string());
        self
    }

    /// Returns true when the user holds the permission.
    #[must_use]
    pub fn allows(&self, user: &User, permission: &str) -> bool {
        if user.is_administrator() {
            return true;
        }
        user.roles.iter().any(|role| {
            self.roles
                .get(role.as_str())
                .is_some_and(|patterns| patterns.iter().any(|p| pattern_matches(p, permission)))
        })
    }

    /// Checks a permission.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::NotEnoughPermissions`] when not granted.
    pub fn check(&self, user: &User, permission: &str) -> Result<(), PermissionError> {
        if self.allows(user, permission) {
            Ok(())
        } else {
            Err(PermissionError::NotEnoughPermissions(permission.to_string()))
        }
    }

    /// Lists the record actions the user holds on a model.
    #[must_use]
    pub fn record_actions(&self, user: Option<&User>, model: &ModelName) -> RecordPermissions {
        let allows = |action| {
            user.is_some_and(|user| self.allows(user, &record_permission(model, action)))
        };
        RecordPermissions {
            can_create: allows(RecordAction::Create),
            can_read: allows(RecordAction::Read),
            can_update: allows(RecordAction::Update),
            can_delete: allows(RecordAction::Delete),
        }
    }
}

/// Record permission flags exposed to clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPermissions {
    /// May insert.
    pub can_create: bool,
    /// May read.
    pub can_read: bool,
    /// May modify.
    pub can_update: bool,
    /// May remove.
    pub can_delete: bool,
}

/// Matches a granted pattern against a permission.
fn pattern_matches(pattern: &str, permission: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    pattern
        .strip_suffix('*')
        .map_or_else(|| pattern == permission, |prefix| permission.starts_with(prefix))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
