// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The Events service: creation with project fan-out, cancellation,
//! deletion, and the Worker/Job state machines.
//!
//! Every phase change goes through one conditional store update carrying the
//! expected current phase, so a cancel racing a scheduler pickup is decided
//! by whoever commits first; the loser observes `Conflict`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use ulid::Ulid;

use gantry_api::{
    Driver, Event, EventList, EventsSelector, Job, JobStatus, ListOptions, Phase, Project,
    SourceState, Worker, WorkerStatus, roles, validation,
};

use crate::authn::{self, Principal};
use crate::authz::Authorize;
use crate::error::{CoreError, Result};
use crate::store::{EventsStore, ProjectsStore};
use crate::substrate::Substrate;

/// Orchestrates Events and the Workers and Jobs embedded in them.
pub struct EventsService {
    authorizer: Arc<dyn Authorize>,
    projects: Arc<dyn ProjectsStore>,
    events: Arc<dyn EventsStore>,
    substrate: Arc<dyn Substrate>,
}

impl EventsService {
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

    /// Accept an Event and materialize it against subscribed Projects.
    ///
    /// With a `project_id` the Event targets exactly that Project; without
    /// one it fans out to every Project whose subscriptions match. Each
    /// materialized Event gets a fresh ID, a frozen copy of the Project's
    /// worker template, a PENDING worker, and a message on the work queue.
    ///
    /// Fan-out is not atomic: Events already materialized stay if a later
    /// one fails.
    #[instrument(
        skip(self, principal, event),
        fields(source = %event.source, event_type = %event.event_type)
    )]
    pub async fn create(&self, principal: &Principal, event: Event) -> Result<Vec<Event>> {
        self.authorizer
            .authorize(principal, roles::names::EVENT_CREATOR, &event.source)
            .await?;

        validation::validate_source(&event.source)?;
        validation::validate_event_type(&event.event_type)?;
        validation::validate_kv_keys("qualifiers", &event.qualifiers)?;
        validation::validate_kv_keys("labels", &event.labels)?;

        let projects: Vec<Project> = match &event.project_id {
            Some(project_id) => vec![self.projects.get(project_id).await?],
            None => self
                .projects
                .list()
                .await?
                .into_iter()
                .filter(|p| p.subscribes_to(&event))
                .collect(),
        };

        let mut created = Vec::with_capacity(projects.len());
        for project in &projects {
            let materialized = materialize(&event, project);
            self.events.create(&materialized).await?;
            self.substrate.schedule_worker(&materialized).await?;
            info!(
                event_id = %materialized.id,
                project_id = %project.id,
                "Event created"
            );
            created.push(materialized);
        }
        Ok(created)
    }

    pub async fn get(&self, principal: &Principal, id: &str) -> Result<Event> {
        let event = self.events.get(id).await?;
        self.authorize_read(principal, &event).await?;
        Ok(event)
    }

    pub async fn list(
        &self,
        principal: &Principal,
        selector: &EventsSelector,
        opts: &ListOptions,
    ) -> Result<EventList> {
        match principal {
            Principal::Scheduler | Principal::Observer => {}
            _ => {
                let scope = selector.project_id.as_deref().unwrap_or("*");
                self.authorizer
                    .authorize(principal, roles::names::PROJECT_USER, scope)
                    .await?;
            }
        }
        self.events.list(selector, opts).await
    }

    /// Cancel an Event whose worker has not started. The conditional
    /// PENDING -> ABORTED update is authoritative: if the scheduler's
    /// PENDING -> STARTING commits first this fails with `Conflict`.
    #[instrument(skip(self, principal))]
    pub async fn cancel(&self, principal: &Principal, id: &str) -> Result<()> {
        let event = self.events.get(id).await?;
        let project_id = event.project_id.clone().unwrap_or_default();
        self.authorizer
            .authorize(principal, roles::names::PROJECT_USER, &project_id)
            .await?;

        let status = WorkerStatus {
            phase: Phase::Aborted,
            started: event.worker.status.started,
            ended: Some(Utc::now()),
        };
        self.events
            .update_worker_status(id, Phase::Pending, &status)
            .await?;
        self.substrate.unschedule_worker(&event).await?;
        info!(event_id = %id, "Event canceled");
        Ok(())
    }

    /// Remove an Event entirely. Live substrate resources are torn down
    /// first (substrate-first deletes), then the document.
    #[instrument(skip(self, principal))]
    pub async fn delete(&self, principal: &Principal, id: &str) -> Result<()> {
        let event = self.events.get(id).await?;
        let project_id = event.project_id.clone().unwrap_or_default();
        self.authorizer
            .authorize(principal, roles::names::PROJECT_USER, &project_id)
            .await?;

        match event.worker.status.phase {
            Phase::Pending => self.substrate.unschedule_worker(&event).await?,
            Phase::Starting | Phase::Running => {
                match self.projects.get(&project_id).await {
                    Ok(project) => {
                        self.substrate
                            .delete_worker_and_jobs(&project, &event)
                            .await?;
                    }
                    // The project is mid-deletion; namespace teardown
                    // collects the pods.
                    Err(CoreError::NotFound { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            _ => {}
        }

        self.events.delete(id).await?;
        info!(event_id = %id, "Event deleted");
        Ok(())
    }

    /// Replace the opaque source-specific state the originating gateway
    /// reads back.
    pub async fn update_source_state(
        &self,
        principal: &Principal,
        id: &str,
        state: SourceState,
    ) -> Result<()> {
        let event = self.events.get(id).await?;
        self.authorizer
            .authorize(principal, roles::names::EVENT_CREATOR, &event.source)
            .await?;
        self.events.update_source_state(id, &state).await
    }

    /// Drive the worker state machine.
    ///
    /// The scheduler may only take PENDING -> STARTING (which issues the
    /// per-event worker token and creates the pod); the observer drives
    /// every later transition. Terminal phases reject everything.
    #[instrument(skip(self, principal, status), fields(to = %status.phase))]
    pub async fn update_worker_status(
        &self,
        principal: &Principal,
        id: &str,
        status: WorkerStatus,
    ) -> Result<()> {
        let event = self.events.get(id).await?;
        let from = event.worker.status.phase;
        let to = status.phase;

        let driver = from.transition(to).ok_or_else(|| {
            CoreError::conflict("Worker", id, format!("transition {from} -> {to} is not allowed"))
        })?;
        match driver {
            Driver::Scheduler => {
                self.authorizer
                    .authorize(principal, roles::names::SCHEDULER, roles::SCOPE_GLOBAL)
                    .await?;
            }
            Driver::Observer => {
                self.authorizer
                    .authorize(principal, roles::names::OBSERVER, roles::SCOPE_GLOBAL)
                    .await?;
            }
            Driver::Canceler => {
                return Err(CoreError::conflict(
                    "Worker",
                    id,
                    "cancellation must go through the cancel operation",
                ));
            }
        }

        let new_status = next_worker_status(&event.worker.status, &status);
        self.events
            .update_worker_status(id, from, &new_status)
            .await?;

        if from == Phase::Pending && to == Phase::Starting {
            self.launch_worker(&event, &new_status).await?;
        }
        Ok(())
    }

    /// Issue the worker token and create the pod; on substrate failure the
    /// worker is marked SCHEDULING_FAILED (best effort) and the error
    /// surfaces.
    async fn launch_worker(&self, event: &Event, status: &WorkerStatus) -> Result<()> {
        let project_id = event.project_id.clone().unwrap_or_default();
        let project = self.projects.get(&project_id).await?;

        let token = authn::generate_token();
        self.events
            .set_worker_token(&event.id, &authn::hash_token(&token))
            .await?;

        if let Err(e) = self.substrate.start_worker(&project, event, &token).await {
            warn!(event_id = %event.id, error = %e, "Worker launch failed");
            let failed = WorkerStatus {
                phase: Phase::SchedulingFailed,
                started: status.started,
                ended: Some(Utc::now()),
            };
            if let Err(update_err) = self
                .events
                .update_worker_status(&event.id, Phase::Starting, &failed)
                .await
            {
                warn!(
                    event_id = %event.id,
                    error = %update_err,
                    "Could not record scheduling failure"
                );
            }
            return Err(e);
        }
        info!(event_id = %event.id, "Worker started");
        Ok(())
    }

    /// Create a Job under an Event's worker. Only that Event's own worker
    /// may do this, and only while it is RUNNING.
    #[instrument(skip(self, principal, job), fields(job = %name))]
    pub async fn create_job(
        &self,
        principal: &Principal,
        event_id: &str,
        name: &str,
        mut job: Job,
    ) -> Result<()> {
        self.authorizer
            .authorize(principal, roles::names::WORKER, event_id)
            .await?;
        validation::validate_job_name(name)?;
        if job.spec.primary_container.image.is_empty() {
            return Err(CoreError::bad_request("job primary container needs an image"));
        }

        let event = self.events.get(event_id).await?;
        if event.worker.status.phase != Phase::Running {
            return Err(CoreError::conflict(
                "Worker",
                event_id,
                "jobs may only be created while the worker is RUNNING",
            ));
        }

        job.status = JobStatus::default();
        self.events.create_job(event_id, name, &job).await?;

        let project_id = event.project_id.clone().unwrap_or_default();
        let project = self.projects.get(&project_id).await?;
        self.substrate
            .store_job_environment(&project, &event, name, &job.spec)
            .await?;
        self.substrate.schedule_job(&event, name).await?;
        info!(event_id = %event_id, job = %name, "Job created");
        Ok(())
    }

    /// Drive a Job's state machine; same table and drivers as workers, with
    /// the observer also covering the pending-abort edge (a worker abort
    /// takes its pending jobs down).
    #[instrument(skip(self, principal, status), fields(job = %name, to = %status.phase))]
    pub async fn update_job_status(
        &self,
        principal: &Principal,
        event_id: &str,
        name: &str,
        status: JobStatus,
    ) -> Result<()> {
        let event = self.events.get(event_id).await?;
        let job = event
            .worker
            .jobs
            .get(name)
            .ok_or_else(|| CoreError::not_found("Job", name))?;

        let from = job.status.phase;
        let to = status.phase;
        let driver = from.transition(to).ok_or_else(|| {
            CoreError::conflict("Job", name, format!("transition {from} -> {to} is not allowed"))
        })?;
        match driver {
            Driver::Scheduler => {
                self.authorizer
                    .authorize(principal, roles::names::SCHEDULER, roles::SCOPE_GLOBAL)
                    .await?;
            }
            Driver::Observer | Driver::Canceler => {
                self.authorizer
                    .authorize(principal, roles::names::OBSERVER, roles::SCOPE_GLOBAL)
                    .await?;
            }
        }

        let new_status = next_job_status(&job.status, &status);
        self.events
            .update_job_status(event_id, name, from, &new_status)
            .await?;

        if from == Phase::Pending && to == Phase::Starting {
            self.launch_job(&event, name, &new_status).await?;
        }
        Ok(())
    }

    async fn launch_job(&self, event: &Event, name: &str, status: &JobStatus) -> Result<()> {
        let project_id = event.project_id.clone().unwrap_or_default();
        let project = self.projects.get(&project_id).await?;

        if let Err(e) = self.substrate.start_job(&project, event, name).await {
            warn!(event_id = %event.id, job = %name, error = %e, "Job launch failed");
            let failed = JobStatus {
                phase: Phase::SchedulingFailed,
                started: status.started,
                ended: Some(Utc::now()),
            };
            if let Err(update_err) = self
                .events
                .update_job_status(&event.id, name, Phase::Starting, &failed)
                .await
            {
                warn!(
                    event_id = %event.id,
                    job = %name,
                    error = %update_err,
                    "Could not record scheduling failure"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    async fn authorize_read(&self, principal: &Principal, event: &Event) -> Result<()> {
        match principal {
            // The event's own worker reads it to interpret the pipeline;
            // the daemons read events they drive.
            Principal::Worker { event_id } if *event_id == event.id => Ok(()),
            Principal::Scheduler | Principal::Observer => Ok(()),
            _ => {
                let project_id = event.project_id.as_deref().unwrap_or_default();
                self.authorizer
                    .authorize(principal, roles::names::PROJECT_USER, project_id)
                    .await
            }
        }
    }
}

/// Build the per-project materialization of an incoming Event.
fn materialize(event: &Event, project: &Project) -> Event {
    let mut materialized = event.clone();
    materialized.id = Ulid::new().to_string();
    materialized.project_id = Some(project.id.clone());
    materialized.created = Some(Utc::now());
    // Snapshot semantics: template edits never reach already-created events.
    materialized.worker = Worker {
        spec: project.spec.worker_template.clone(),
        status: WorkerStatus::default(),
        jobs: BTreeMap::new(),
    };
    materialized
}

/// Merge an incoming worker status with the stored one. Timestamps are
/// monotonic: `started` is pinned once set, `ended` is filled at terminal
/// phases.
fn next_worker_status(current: &WorkerStatus, incoming: &WorkerStatus) -> WorkerStatus {
    let now = Utc::now();
    let started = current
        .started
        .or(incoming.started)
        .or_else(|| (incoming.phase == Phase::Running).then_some(now));
    let ended = current
        .ended
        .or(incoming.ended)
        .or_else(|| incoming.phase.is_terminal().then_some(now));
    WorkerStatus {
        phase: incoming.phase,
        started,
        ended,
    }
}

fn next_job_status(current: &JobStatus, incoming: &JobStatus) -> JobStatus {
    let now = Utc::now();
    let started = current
        .started
        .or(incoming.started)
        .or_else(|| (incoming.phase == Phase::Running).then_some(now));
    let ended = current
        .ended
        .or(incoming.ended)
        .or_else(|| incoming.phase.is_terminal().then_some(now));
    JobStatus {
        phase: incoming.phase,
        started,
        ended,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_snapshots_the_template() {
        let event = Event {
            source: "forge.sh/cli".to_string(),
            event_type: "exec".to_string(),
            ..Default::default()
        };
        let mut project = Project {
            id: "hello".to_string(),
            ..Default::default()
        };
        project.spec.worker_template.container = Some(gantry_api::ContainerSpec {
            image: "alpine".to_string(),
            command: vec!["echo".to_string(), "hi".to_string()],
            ..Default::default()
        });

        let materialized = materialize(&event, &project);
        assert_eq!(materialized.id.len(), 26);
        assert_eq!(materialized.project_id.as_deref(), Some("hello"));
        assert_eq!(materialized.worker.status.phase, Phase::Pending);
        let container = materialized.worker.spec.container.unwrap();
        assert_eq!(container.image, "alpine");

        // A later template edit must not leak into the materialized event.
        project.spec.worker_template.container = None;
        assert_eq!(
            materialize(&event, &project).worker.spec.container,
            None
        );
    }

    #[test]
    fn test_status_timestamps_are_monotonic() {
        let started_at = Utc::now();
        let current = WorkerStatus {
            phase: Phase::Running,
            started: Some(started_at),
            ended: None,
        };
        let incoming = WorkerStatus {
            phase: Phase::Succeeded,
            started: Some(Utc::now()),
            ended: None,
        };
        let next = next_worker_status(&current, &incoming);
        assert_eq!(next.started, Some(started_at));
        assert!(next.ended.is_some());
    }
}
