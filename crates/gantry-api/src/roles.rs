// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Roles and role assignments.
//!
//! A Role is a named, optionally project-scoped capability grant. Role
//! assignments bind a Role to a User or ServiceAccount; reserved principals
//! (root, scheduler, observer, workers) carry fixed role sets instead.

use serde::{Deserialize, Serialize};

/// Scope value meaning "all projects" / "unscoped".
pub const SCOPE_GLOBAL: &str = "*";

/// Role names understood by the control plane.
pub mod names {
    /// Full administrative access to identity and role management.
    pub const ADMIN: &str = "ADMIN";
    /// Read access to system-level state; held by all reserved principals.
    pub const READER: &str = "READER";
    /// May create Events for the source named by the scope.
    pub const EVENT_CREATOR: &str = "EVENT_CREATOR";
    /// May create Projects.
    pub const PROJECT_CREATOR: &str = "PROJECT_CREATOR";
    /// Full control over the Project named by the scope.
    pub const PROJECT_ADMIN: &str = "PROJECT_ADMIN";
    /// May update the spec of the Project named by the scope.
    pub const PROJECT_DEVELOPER: &str = "PROJECT_DEVELOPER";
    /// May read the Project named by the scope and manage its Events.
    pub const PROJECT_USER: &str = "PROJECT_USER";
    /// May launch Workers and Jobs (scheduler daemon only).
    pub const SCHEDULER: &str = "SCHEDULER";
    /// May update Worker and Job statuses (observer daemon only).
    pub const OBSERVER: &str = "OBSERVER";
    /// May create Jobs under the Event named by the scope.
    pub const WORKER: &str = "WORKER";
}

/// Disambiguates the kind of principal a role assignment refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrincipalType {
    User,
    ServiceAccount,
}

impl PrincipalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalType::User => "USER",
            PrincipalType::ServiceAccount => "SERVICE_ACCOUNT",
        }
    }

    pub fn parse(s: &str) -> Option<PrincipalType> {
        match s {
            "USER" => Some(PrincipalType::User),
            "SERVICE_ACCOUNT" => Some(PrincipalType::ServiceAccount),
            _ => None,
        }
    }
}

/// A named, optionally scoped capability grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub name: String,
    /// `*` or a specific Project ID (or source / event ID, depending on the
    /// role).
    #[serde(default = "global_scope")]
    pub scope: String,
}

fn global_scope() -> String {
    SCOPE_GLOBAL.to_string()
}

impl Role {
    pub fn new(name: &str, scope: &str) -> Self {
        Self {
            name: name.to_string(),
            scope: scope.to_string(),
        }
    }

    /// An unscoped (`*`) role.
    pub fn global(name: &str) -> Self {
        Self::new(name, SCOPE_GLOBAL)
    }

    /// Whether this role grants `name` over `scope`. A role scoped `*`
    /// grants every scope of the same name.
    pub fn grants(&self, name: &str, scope: &str) -> bool {
        self.name == name && (self.scope == SCOPE_GLOBAL || self.scope == scope)
    }
}

/// The binding of a Role to a principal. Unique on the full
/// `(principal_type, principal_id, role_name, role_scope)` quadruple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub principal_type: PrincipalType,
    pub principal_id: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_grants_scoping() {
        let scoped = Role::new(names::PROJECT_ADMIN, "hello");
        assert!(scoped.grants(names::PROJECT_ADMIN, "hello"));
        assert!(!scoped.grants(names::PROJECT_ADMIN, "other"));
        assert!(!scoped.grants(names::PROJECT_USER, "hello"));

        let global = Role::global(names::PROJECT_ADMIN);
        assert!(global.grants(names::PROJECT_ADMIN, "hello"));
        assert!(global.grants(names::PROJECT_ADMIN, "other"));
    }

    #[test]
    fn test_role_scope_defaults_to_global_on_the_wire() {
        let role: Role = serde_json::from_str(r#"{"name": "PROJECT_CREATOR"}"#).unwrap();
        assert_eq!(role.scope, SCOPE_GLOBAL);
    }

    #[test]
    fn test_principal_type_round_trip() {
        for pt in [PrincipalType::User, PrincipalType::ServiceAccount] {
            assert_eq!(PrincipalType::parse(pt.as_str()), Some(pt));
        }
        assert_eq!(PrincipalType::parse("ROBOT"), None);
    }
}
