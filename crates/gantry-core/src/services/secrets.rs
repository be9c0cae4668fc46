// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The Secrets service. Values live only in the Project's substrate secret;
//! the document store never sees them and list responses are redacted.

use std::sync::Arc;

use tracing::{info, instrument};

use gantry_api::{Secret, roles};

use crate::authn::Principal;
use crate::authz::Authorize;
use crate::error::{CoreError, Result};
use crate::store::ProjectsStore;
use crate::substrate::SecretsStore;

/// Manages per-project secrets.
pub struct SecretsService {
    authorizer: Arc<dyn Authorize>,
    projects: Arc<dyn ProjectsStore>,
    secrets: Arc<dyn SecretsStore>,
}

impl SecretsService {
    pub fn new(
        authorizer: Arc<dyn Authorize>,
        projects: Arc<dyn ProjectsStore>,
        secrets: Arc<dyn SecretsStore>,
    ) -> Self {
        Self {
            authorizer,
            projects,
            secrets,
        }
    }

    /// Keys only; values come back redacted.
    pub async fn list(&self, principal: &Principal, project_id: &str) -> Result<Vec<Secret>> {
        self.authorizer
            .authorize(principal, roles::names::PROJECT_ADMIN, project_id)
            .await?;
        let project = self.projects.get(project_id).await?;
        self.secrets.list(&project).await
    }

    #[instrument(skip(self, principal, secret), fields(key = %secret.key))]
    pub async fn set(
        &self,
        principal: &Principal,
        project_id: &str,
        secret: Secret,
    ) -> Result<()> {
        self.authorizer
            .authorize(principal, roles::names::PROJECT_ADMIN, project_id)
            .await?;
        if secret.key.is_empty() {
            return Err(CoreError::bad_request("secret key must not be empty"));
        }
        let project = self.projects.get(project_id).await?;
        self.secrets.set(&project, secret).await?;
        info!(project_id = %project_id, "Secret set");
        Ok(())
    }

    #[instrument(skip(self, principal))]
    pub async fn unset(&self, principal: &Principal, project_id: &str, key: &str) -> Result<()> {
        self.authorizer
            .authorize(principal, roles::names::PROJECT_ADMIN, project_id)
            .await?;
        let project = self.projects.get(project_id).await?;
        self.secrets.unset(&project, key).await?;
        info!(project_id = %project_id, key = %key, "Secret unset");
        Ok(())
    }
}
