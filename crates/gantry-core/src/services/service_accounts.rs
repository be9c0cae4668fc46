// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The ServiceAccounts service.
//!
//! A service account's raw token is returned exactly once: at creation, and
//! again on unlock, which rotates it. Only hashes are stored.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use gantry_api::{ServiceAccount, Token, roles, validation};

use crate::authn::{Principal, generate_token, hash_token};
use crate::authz::Authorize;
use crate::error::Result;
use crate::store::ServiceAccountsStore;

/// Administers ServiceAccounts.
pub struct ServiceAccountsService {
    authorizer: Arc<dyn Authorize>,
    service_accounts: Arc<dyn ServiceAccountsStore>,
}

impl ServiceAccountsService {
    pub fn new(
        authorizer: Arc<dyn Authorize>,
        service_accounts: Arc<dyn ServiceAccountsStore>,
    ) -> Self {
        Self {
            authorizer,
            service_accounts,
        }
    }

    /// Create a service account and return its one-time token.
    #[instrument(skip(self, principal, service_account), fields(id = %service_account.id))]
    pub async fn create(
        &self,
        principal: &Principal,
        mut service_account: ServiceAccount,
    ) -> Result<Token> {
        self.authorizer
            .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
            .await?;
        validation::validate_service_account_id(&service_account.id)?;

        service_account.locked = None;
        service_account.created = Some(Utc::now());

        let token = generate_token();
        self.service_accounts
            .create(&service_account, &hash_token(&token))
            .await?;
        info!(id = %service_account.id, "Service account created");
        Ok(Token {
            value: token,
            expires: None,
            auth_url: None,
        })
    }

    pub async fn list(&self, principal: &Principal) -> Result<Vec<ServiceAccount>> {
        self.authorizer
            .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
            .await?;
        self.service_accounts.list().await
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> Result<ServiceAccount> {
        match principal {
            Principal::ServiceAccount { id: own_id } if own_id == id => {}
            _ => {
                self.authorizer
                    .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
                    .await?;
            }
        }
        self.service_accounts.get(id).await
    }

    /// Lock the account; its token stops resolving immediately.
    #[instrument(skip(self, principal))]
    pub async fn lock(&self, principal: &Principal, id: &str) -> Result<()> {
        self.authorizer
            .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
            .await?;
        self.service_accounts.set_locked(id, Some(Utc::now())).await?;
        info!(id = %id, "Service account locked");
        Ok(())
    }

    /// Unlock the account. The old token stays dead; a fresh one is issued
    /// and returned.
    #[instrument(skip(self, principal))]
    pub async fn unlock(&self, principal: &Principal, id: &str) -> Result<Token> {
        self.authorizer
            .authorize(principal, roles::names::ADMIN, roles::SCOPE_GLOBAL)
            .await?;
        self.service_accounts.set_locked(id, None).await?;

        let token = generate_token();
        self.service_accounts
            .set_token(id, &hash_token(&token))
            .await?;
        info!(id = %id, "Service account unlocked, token rotated");
        Ok(Token {
            value: token,
            expires: None,
            auth_url: None,
        })
    }
}
