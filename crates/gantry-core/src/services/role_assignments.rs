// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The RoleAssignments service: granting and revoking roles on Users and
//! ServiceAccounts.

use std::sync::Arc;

use tracing::{info, instrument};

use gantry_api::{PrincipalType, RoleAssignment, roles};

use crate::authn::Principal;
use crate::authz::Authorize;
use crate::error::Result;
use crate::store::{RoleAssignmentsStore, ServiceAccountsStore, UsersStore};

/// Administers RoleAssignments.
pub struct RoleAssignmentsService {
    authorizer: Arc<dyn Authorize>,
    role_assignments: Arc<dyn RoleAssignmentsStore>,
    users: Arc<dyn UsersStore>,
    service_accounts: Arc<dyn ServiceAccountsStore>,
}

impl RoleAssignmentsService {
    pub fn new(
        authorizer: Arc<dyn Authorize>,
        role_assignments: Arc<dyn RoleAssignmentsStore>,
        users: Arc<dyn UsersStore>,
        service_accounts: Arc<dyn ServiceAccountsStore>,
    ) -> Self {
        Self {
            authorizer,
            role_assignments,
            users,
            service_accounts,
        }
    }

    /// The principal named by the assignment must exist.
    async fn check_principal(&self, assignment: &RoleAssignment) -> Result<()> {
        match assignment.principal_type {
            PrincipalType::User => {
                self.users.get(&assignment.principal_id).await?;
            }
            PrincipalType::ServiceAccount => {
                self.service_accounts.get(&assignment.principal_id).await?;
            }
        }
        Ok(())
    }

    /// Grant a role. Granting an assignment that already exists is
    /// idempotent.
    #[instrument(
        skip(self, principal, assignment),
        fields(
            principal_id = %assignment.principal_id,
            role = %assignment.role.name,
            scope = %assignment.role.scope
        )
    )]
    pub async fn grant(&self, principal: &Principal, assignment: RoleAssignment) -> Result<()> {
        self.authorizer
            .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
            .await?;
        self.check_principal(&assignment).await?;
        self.role_assignments.grant(&assignment).await?;
        info!("Role granted");
        Ok(())
    }

    /// Revoke a role. Fails with `NotFound` when the assignment does not
    /// exist.
    #[instrument(
        skip(self, principal, assignment),
        fields(
            principal_id = %assignment.principal_id,
            role = %assignment.role.name,
            scope = %assignment.role.scope
        )
    )]
    pub async fn revoke(&self, principal: &Principal, assignment: RoleAssignment) -> Result<()> {
        self.authorizer
            .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
            .await?;
        self.role_assignments.revoke(&assignment).await?;
        info!("Role revoked");
        Ok(())
    }

    pub async fn list(&self, principal: &Principal) -> Result<Vec<RoleAssignment>> {
        self.authorizer
            .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
            .await?;
        self.role_assignments.list().await
    }
}
