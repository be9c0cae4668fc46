// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The Logs gateway: forwards Worker and Job pod logs from the substrate.
//! Forwarding only; the core does not multiplex or retain log streams.

use std::sync::Arc;

use gantry_api::roles;

use crate::authn::Principal;
use crate::authz::Authorize;
use crate::error::{CoreError, Result};
use crate::store::{EventsStore, ProjectsStore};
use crate::substrate::{LogsSelector, Substrate};

/// Forwards execution logs for an Event.
pub struct LogsService {
    authorizer: Arc<dyn Authorize>,
    projects: Arc<dyn ProjectsStore>,
    events: Arc<dyn EventsStore>,
    substrate: Arc<dyn Substrate>,
}

impl LogsService {
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

    pub async fn get(
        &self,
        principal: &Principal,
        event_id: &str,
        selector: &LogsSelector,
    ) -> Result<String> {
        let event = self.events.get(event_id).await?;
        let project_id = event.project_id.clone().unwrap_or_default();
        self.authorizer
            .authorize(principal, roles::names::PROJECT_USER, &project_id)
            .await?;

        if let Some(job_name) = &selector.job
            && !event.worker.jobs.contains_key(job_name)
        {
            return Err(CoreError::not_found("Job", job_name));
        }

        let project = self.projects.get(&project_id).await?;
        self.substrate.get_logs(&project, &event, selector).await
    }
}
