// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authorization: role checks over principals.
//!
//! Every domain operation starts with `authorize(principal, role, scope)`.
//! Reserved principals are matched against their compile-time role sets;
//! Users and ServiceAccounts are matched against the role-assignments store.
//! A role scoped `*` grants every scope of the same name.

use std::sync::Arc;

use async_trait::async_trait;

use crate::authn::Principal;
use crate::error::CoreError;
use crate::store::RoleAssignmentsStore;

/// The authorization check consulted by every domain operation.
#[async_trait]
pub trait Authorize: Send + Sync {
    /// Succeeds when `principal` holds `role` over `scope`; fails with
    /// `Authorization` otherwise.
    async fn authorize(
        &self,
        principal: &Principal,
        role: &str,
        scope: &str,
    ) -> Result<(), CoreError>;
}

/// Store-backed implementation of [`Authorize`].
pub struct RoleAuthorizer {
    assignments: Arc<dyn RoleAssignmentsStore>,
}

impl RoleAuthorizer {
    pub fn new(assignments: Arc<dyn RoleAssignmentsStore>) -> Self {
        Self { assignments }
    }
}

#[async_trait]
impl Authorize for RoleAuthorizer {
    async fn authorize(
        &self,
        principal: &Principal,
        role: &str,
        scope: &str,
    ) -> Result<(), CoreError> {
        if let Some(reserved) = principal.reserved_roles() {
            if reserved.iter().any(|r| r.grants(role, scope)) {
                return Ok(());
            }
            return Err(CoreError::Authorization);
        }

        let (principal_type, principal_id) = match principal {
            Principal::User { id } => (gantry_api::PrincipalType::User, id.as_str()),
            Principal::ServiceAccount { id } => {
                (gantry_api::PrincipalType::ServiceAccount, id.as_str())
            }
            // Reserved principals were handled above.
            _ => return Err(CoreError::Authorization),
        };

        let assignments = self
            .assignments
            .list_for_principal(principal_type, principal_id)
            .await?;
        if assignments.iter().any(|a| a.role.grants(role, scope)) {
            return Ok(());
        }
        Err(CoreError::Authorization)
    }
}

/// Test double that grants everything.
pub struct AlwaysAuthorize;

#[async_trait]
impl Authorize for AlwaysAuthorize {
    async fn authorize(&self, _: &Principal, _: &str, _: &str) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Test double that denies everything.
pub struct NeverAuthorize;

#[async_trait]
impl Authorize for NeverAuthorize {
    async fn authorize(&self, _: &Principal, _: &str, _: &str) -> Result<(), CoreError> {
        Err(CoreError::Authorization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryRoleAssignmentsStore;
    use gantry_api::{PrincipalType, Role, RoleAssignment, roles};

    fn assignment(id: &str, role: &str, scope: &str) -> RoleAssignment {
        RoleAssignment {
            principal_type: PrincipalType::ServiceAccount,
            principal_id: id.to_string(),
            role: Role::new(role, scope),
        }
    }

    #[tokio::test]
    async fn test_reserved_principals_use_fixed_role_sets() {
        let authorizer = RoleAuthorizer::new(Arc::new(MemoryRoleAssignmentsStore::new()));

        authorizer
            .authorize(&Principal::Root, roles::names::ADMIN, "*")
            .await
            .unwrap();
        authorizer
            .authorize(&Principal::Root, roles::names::PROJECT_ADMIN, "hello")
            .await
            .unwrap();
        authorizer
            .authorize(&Principal::Scheduler, roles::names::SCHEDULER, "*")
            .await
            .unwrap();

        let err = authorizer
            .authorize(&Principal::Scheduler, roles::names::ADMIN, "*")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "AUTHORIZATION");

        let err = authorizer
            .authorize(&Principal::Observer, roles::names::SCHEDULER, "*")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "AUTHORIZATION");
    }

    #[tokio::test]
    async fn test_worker_roles_are_event_scoped() {
        let authorizer = RoleAuthorizer::new(Arc::new(MemoryRoleAssignmentsStore::new()));
        let worker = Principal::Worker {
            event_id: "evt-1".to_string(),
        };

        authorizer
            .authorize(&worker, roles::names::WORKER, "evt-1")
            .await
            .unwrap();
        let err = authorizer
            .authorize(&worker, roles::names::WORKER, "evt-2")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "AUTHORIZATION");
    }

    #[tokio::test]
    async fn test_assigned_roles_respect_scope() {
        let store = Arc::new(MemoryRoleAssignmentsStore::new());
        store
            .grant(&assignment("ci", roles::names::PROJECT_USER, "hello"))
            .await
            .unwrap();
        store
            .grant(&assignment("admin-bot", roles::names::PROJECT_USER, "*"))
            .await
            .unwrap();
        let authorizer = RoleAuthorizer::new(store);

        let ci = Principal::ServiceAccount {
            id: "ci".to_string(),
        };
        authorizer
            .authorize(&ci, roles::names::PROJECT_USER, "hello")
            .await
            .unwrap();
        let err = authorizer
            .authorize(&ci, roles::names::PROJECT_USER, "other")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "AUTHORIZATION");

        // A global grant enumerates across all projects.
        let bot = Principal::ServiceAccount {
            id: "admin-bot".to_string(),
        };
        authorizer
            .authorize(&bot, roles::names::PROJECT_USER, "other")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_doubles() {
        let user = Principal::User {
            id: "a@b.c".to_string(),
        };
        AlwaysAuthorize
            .authorize(&user, roles::names::ADMIN, "*")
            .await
            .unwrap();
        let err = NeverAuthorize
            .authorize(&Principal::Root, roles::names::ADMIN, "*")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "AUTHORIZATION");
    }
}
