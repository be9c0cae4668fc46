// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The execution substrate abstraction.
//!
//! The substrate is the only layer that knows about Kubernetes; domain
//! services traffic exclusively in domain types through the [`Substrate`]
//! and [`SecretsStore`] traits. Two implementations exist: the real
//! Kubernetes one and an in-memory mock for tests.
//!
//! Pod and secret names are deterministic functions of Event/Job IDs so
//! cleanup stays idempotent across restarts.

pub mod kubernetes;
pub mod mock;
pub mod queue;

pub use kubernetes::{KubernetesSecretsStore, KubernetesSubstrate};
pub use mock::{MockSecretsStore, MockSubstrate};
pub use queue::{PostgresWorkQueue, WorkQueue};

use async_trait::async_trait;

use gantry_api::{Event, JobSpec, KubernetesConfig, Project, Secret};

use crate::error::CoreError;

/// Which logs to forward for an Event.
#[derive(Debug, Clone, Default)]
pub struct LogsSelector {
    /// Job name; absent means the worker's logs.
    pub job: Option<String>,
    /// Container name; absent means the pod's default container.
    pub container: Option<String>,
}

/// Narrow interface over the execution layer.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Provision the Project's namespace, service account, RBAC binding, and
    /// well-known secrets. Idempotent on the namespace name.
    async fn create_project(&self, project: &Project) -> Result<KubernetesConfig, CoreError>;

    /// Tear down the Project's namespace and everything in it.
    async fn delete_project(&self, project: &Project) -> Result<(), CoreError>;

    /// Put the Event's worker on the work queue for the scheduler daemon.
    async fn schedule_worker(&self, event: &Event) -> Result<(), CoreError>;

    /// Remove the Event's worker from the work queue (cancellation).
    async fn unschedule_worker(&self, event: &Event) -> Result<(), CoreError>;

    /// Synchronously create the worker pod. `token` is the raw per-event
    /// worker bearer token, injected into the pod environment.
    async fn start_worker(
        &self,
        project: &Project,
        event: &Event,
        token: &str,
    ) -> Result<(), CoreError>;

    /// Store a Job's environment as a substrate secret; returns the names of
    /// the secrets created.
    async fn store_job_environment(
        &self,
        project: &Project,
        event: &Event,
        job_name: &str,
        spec: &JobSpec,
    ) -> Result<Vec<String>, CoreError>;

    /// Put a Job on the work queue for the scheduler daemon.
    async fn schedule_job(&self, event: &Event, job_name: &str) -> Result<(), CoreError>;

    /// Synchronously create a Job pod.
    async fn start_job(
        &self,
        project: &Project,
        event: &Event,
        job_name: &str,
    ) -> Result<(), CoreError>;

    /// Running worker pods across all project namespaces, for admission.
    async fn count_running_workers(&self) -> Result<usize, CoreError>;

    /// Running job pods across all project namespaces, for admission.
    async fn count_running_jobs(&self) -> Result<usize, CoreError>;

    /// Remove the Event's worker pod, job pods, and per-job secrets.
    async fn delete_worker_and_jobs(
        &self,
        project: &Project,
        event: &Event,
    ) -> Result<(), CoreError>;

    /// Forward pod logs for the Event.
    async fn get_logs(
        &self,
        project: &Project,
        event: &Event,
        selector: &LogsSelector,
    ) -> Result<String, CoreError>;
}

/// Per-project secret storage. Secrets live on the substrate; the document
/// store never sees them.
#[async_trait]
pub trait SecretsStore: Send + Sync {
    /// Keys only; values are replaced with [`gantry_api::REDACTED`].
    async fn list(&self, project: &Project) -> Result<Vec<Secret>, CoreError>;

    async fn set(&self, project: &Project, secret: Secret) -> Result<(), CoreError>;

    async fn unset(&self, project: &Project, key: &str) -> Result<(), CoreError>;
}

/// Deterministic substrate resource names.
pub mod names {
    use gantry_api::Project;

    /// Label identifying the owning component of a pod.
    pub const LABEL_COMPONENT: &str = "gantry.sh/component";
    /// Label carrying the owning Event ID.
    pub const LABEL_EVENT: &str = "gantry.sh/event";
    /// Label carrying the owning Project ID.
    pub const LABEL_PROJECT: &str = "gantry.sh/project";

    /// Well-known secret holding user-managed project secrets.
    pub const PROJECT_SECRETS: &str = "project-secrets";
    /// Well-known secret holding registry credentials.
    pub const PROJECT_REGISTRY: &str = "project-registry";
    /// Service account workers and jobs run as.
    pub const WORKER_SERVICE_ACCOUNT: &str = "gantry-worker";

    /// The Project's namespace.
    pub fn namespace(project_id: &str) -> String {
        format!("gantry-project-{project_id}")
    }

    /// Resolve a Project's namespace: the recorded one, or the
    /// deterministic name when provisioning has not happened yet.
    pub fn project_namespace(project: &Project) -> String {
        project
            .kubernetes
            .as_ref()
            .map(|k| k.namespace.clone())
            .unwrap_or_else(|| namespace(&project.id))
    }

    /// The worker pod for an Event.
    pub fn worker_pod(event_id: &str) -> String {
        format!("worker-{}", event_id.to_ascii_lowercase())
    }

    /// A job pod for an Event.
    pub fn job_pod(event_id: &str, job_name: &str) -> String {
        format!("job-{}-{}", event_id.to_ascii_lowercase(), job_name)
    }

    /// The secret carrying a job's environment.
    pub fn job_secret(event_id: &str, job_name: &str) -> String {
        format!("job-{}-{}", event_id.to_ascii_lowercase(), job_name)
    }

}
