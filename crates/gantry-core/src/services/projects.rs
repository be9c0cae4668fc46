// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The Projects service: tenant lifecycle and substrate provisioning.
//!
//! Creates are document-first with a compensating delete when provisioning
//! fails; deletes are substrate-first (events, then namespace, then the
//! document).

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use gantry_api::{ListOptions, Phase, Project, roles, validation};

use crate::authn::Principal;
use crate::authz::Authorize;
use crate::error::{CoreError, Result};
use crate::store::{EventsStore, ProjectsStore};
use crate::substrate::Substrate;

/// Orchestrates Projects and their substrate resources.
pub struct ProjectsService {
    authorizer: Arc<dyn Authorize>,
    projects: Arc<dyn ProjectsStore>,
    events: Arc<dyn EventsStore>,
    substrate: Arc<dyn Substrate>,
}

impl ProjectsService {
    pub fn new(
        authorizer: Arc<dyn Authorize>,
        projects: Arc<dyn ProjectsStore>,
        events: Arc<dyn EventsStore>,
        substrate: Arc<dyn Substrate>,
    ) -> Self {
        Self {
            authorizer,
            projects,
            events,
            substrate,
        }
    }

    /// Create a Project: validate, persist, then provision the namespace,
    /// service account, RBAC binding, and well-known secrets. The document
    /// is rolled back if provisioning fails; on success the `kubernetes`
    /// block is patched in.
    #[instrument(skip(self, principal, project), fields(project_id = %project.id))]
    pub async fn create(&self, principal: &Principal, mut project: Project) -> Result<Project> {
        self.authorizer
            .authorize(principal, roles::names::PROJECT_CREATOR, roles::SCOPE_GLOBAL)
            .await?;

        validation::validate_project_id(&project.id)?;
        for subscription in &project.spec.event_subscriptions {
            validation::validate_source(&subscription.source)?;
            validation::validate_kv_keys("qualifiers", &subscription.qualifiers)?;
            validation::validate_kv_keys("labels", &subscription.labels)?;
        }

        // The kubernetes block is server-owned.
        project.kubernetes = None;
        project.created = Some(Utc::now());

        self.projects.create(&project).await?;

        let kubernetes = match self.substrate.create_project(&project).await {
            Ok(kubernetes) => kubernetes,
            Err(e) => {
                warn!(project_id = %project.id, error = %e, "Provisioning failed, rolling back");
                if let Err(rollback_err) = self.projects.delete(&project.id).await {
                    warn!(
                        project_id = %project.id,
                        error = %rollback_err,
                        "Rollback of project document failed"
                    );
                }
                return Err(CoreError::internal(format!(
                    "provisioning project {:?}: {e}",
                    project.id
                )));
            }
        };

        self.projects.set_kubernetes(&project.id, &kubernetes).await?;
        project.kubernetes = Some(kubernetes);
        info!(project_id = %project.id, "Project created");
        Ok(project)
    }

    /// Reads are scoped: the list carries only the Projects the principal
    /// holds `PROJECT_USER` on, directly or through a global grant.
    pub async fn list(&self, principal: &Principal, _opts: &ListOptions) -> Result<Vec<Project>> {
        let mut visible = Vec::new();
        for project in self.projects.list().await? {
            if self
                .authorizer
                .authorize(principal, roles::names::PROJECT_USER, &project.id)
                .await
                .is_ok()
            {
                visible.push(project);
            }
        }
        Ok(visible)
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> Result<Project> {
        self.authorizer
            .authorize(principal, roles::names::PROJECT_USER, id)
            .await?;
        self.projects.get(id).await
    }

    /// Update the Project's spec. The stored `kubernetes` block is
    /// preserved no matter what the client sent: once set it is immutable.
    #[instrument(skip(self, principal, project), fields(project_id = %project.id))]
    pub async fn update(&self, principal: &Principal, project: Project) -> Result<Project> {
        if self
            .authorizer
            .authorize(principal, roles::names::PROJECT_ADMIN, &project.id)
            .await
            .is_err()
        {
            self.authorizer
                .authorize(principal, roles::names::PROJECT_DEVELOPER, &project.id)
                .await?;
        }

        for subscription in &project.spec.event_subscriptions {
            validation::validate_source(&subscription.source)?;
            validation::validate_kv_keys("qualifiers", &subscription.qualifiers)?;
            validation::validate_kv_keys("labels", &subscription.labels)?;
        }

        let stored = self.projects.get(&project.id).await?;
        let updated = Project {
            kubernetes: stored.kubernetes,
            created: stored.created,
            ..project
        };
        self.projects.update(&updated).await?;
        Ok(updated)
    }

    /// Delete a Project and everything it owns: every Event (with substrate
    /// cleanup for live workers), the namespace, then the document.
    #[instrument(skip(self, principal))]
    pub async fn delete(&self, principal: &Principal, id: &str) -> Result<()> {
        self.authorizer
            .authorize(principal, roles::names::PROJECT_ADMIN, id)
            .await?;

        let project = self.projects.get(id).await?;

        let events = self.events.list_by_project(id).await?;
        for event in &events {
            match event.worker.status.phase {
                Phase::Pending => self.substrate.unschedule_worker(event).await?,
                Phase::Starting | Phase::Running => {
                    self.substrate
                        .delete_worker_and_jobs(&project, event)
                        .await?;
                }
                _ => {}
            }
        }
        let removed = self.events.delete_by_project(id).await?;

        self.substrate.delete_project(&project).await?;
        self.projects.delete(id).await?;
        info!(project_id = %id, events_removed = removed, "Project deleted");
        Ok(())
    }
}
