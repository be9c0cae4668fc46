// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The Users service. Users come into existence through OIDC login; admins
//! can inspect, lock, unlock, and delete them.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use gantry_api::{PrincipalType, User, roles};

use crate::authn::Principal;
use crate::authz::Authorize;
use crate::error::Result;
use crate::store::{RoleAssignmentsStore, SessionsStore, UsersStore};

/// Administers Users.
pub struct UsersService {
    authorizer: Arc<dyn Authorize>,
    users: Arc<dyn UsersStore>,
    sessions: Arc<dyn SessionsStore>,
    role_assignments: Arc<dyn RoleAssignmentsStore>,
}

impl UsersService {
    pub fn new(
        authorizer: Arc<dyn Authorize>,
        users: Arc<dyn UsersStore>,
        sessions: Arc<dyn SessionsStore>,
        role_assignments: Arc<dyn RoleAssignmentsStore>,
    ) -> Self {
        Self {
            authorizer,
            users,
            sessions,
            role_assignments,
        }
    }

    pub async fn list(&self, principal: &Principal) -> Result<Vec<User>> {
        self.authorizer
            .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
            .await?;
        self.users.list().await
    }

    /// Admins may fetch anyone; a user may always fetch themselves.
    pub async fn get(&self, principal: &Principal, id: &str) -> Result<User> {
        match principal {
            Principal::User { id: own_id } if own_id == id => {}
            _ => {
                self.authorizer
                    .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
                    .await?;
            }
        }
        self.users.get(id).await
    }

    /// Remove a user along with their sessions and role assignments.
    #[instrument(skip(self, principal))]
    pub async fn delete(&self, principal: &Principal, id: &str) -> Result<()> {
        self.authorizer
            .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
            .await?;
        self.users.delete(id).await?;
        self.sessions.delete_by_user(id).await?;
        self.role_assignments
            .revoke_all_for_principal(PrincipalType::User, id)
            .await?;
        info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Lock a user out. All of their active sessions are revoked.
    #[instrument(skip(self, principal))]
    pub async fn lock(&self, principal: &Principal, id: &str) -> Result<()> {
        self.authorizer
            .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
            .await?;
        self.users.set_locked(id, Some(Utc::now())).await?;
        let revoked = self.sessions.delete_by_user(id).await?;
        info!(user_id = %id, sessions_revoked = revoked, "User locked");
        Ok(())
    }

    pub async fn unlock(&self, principal: &Principal, id: &str) -> Result<()> {
        self.authorizer
            .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
            .await?;
        self.users.set_locked(id, None).await?;
        info!(user_id = %id, "User unlocked");
        Ok(())
    }
}
