// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock substrate for testing.
//!
//! Records every call so service tests can assert on the interactions, and
//! can be configured to fail provisioning or launches.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use gantry_api::{
    Event, JobSpec, KubernetesConfig, Project, REDACTED, Secret,
};

use crate::error::CoreError;

use super::names::{
    PROJECT_REGISTRY, PROJECT_SECRETS, WORKER_SERVICE_ACCOUNT, job_secret, namespace,
};
use super::{LogsSelector, SecretsStore, Substrate};

/// What the mock substrate has been asked to do so far.
#[derive(Debug, Default, Clone)]
pub struct MockSubstrateState {
    pub created_projects: Vec<String>,
    pub deleted_projects: Vec<String>,
    /// Event IDs currently on the worker queue.
    pub scheduled_workers: Vec<String>,
    /// (event id, raw worker token) pairs passed to start_worker.
    pub started_workers: Vec<(String, String)>,
    /// (event id, job name) pairs on the job queue.
    pub scheduled_jobs: Vec<(String, String)>,
    pub started_jobs: Vec<(String, String)>,
    /// Secret names created per (event id, job name).
    pub stored_job_environments: Vec<(String, String)>,
    /// Event IDs whose pods and secrets were deleted.
    pub deleted_workers: Vec<String>,
}

/// Mock substrate for testing.
#[derive(Default)]
pub struct MockSubstrate {
    state: Arc<Mutex<MockSubstrateState>>,
    /// If true, project provisioning fails.
    pub fail_create_project: bool,
    /// If true, worker and job launches fail.
    pub fail_launches: bool,
    /// What get_logs returns.
    pub logs: String,
}

impl MockSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose provisioning fails.
    pub fn failing_provisioning() -> Self {
        Self {
            fail_create_project: true,
            ..Self::default()
        }
    }

    /// A mock whose pod launches fail.
    pub fn failing_launches() -> Self {
        Self {
            fail_launches: true,
            ..Self::default()
        }
    }

    /// Snapshot of everything recorded so far.
    pub async fn state(&self) -> MockSubstrateState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl Substrate for MockSubstrate {
    async fn create_project(&self, project: &Project) -> Result<KubernetesConfig, CoreError> {
        if self.fail_create_project {
            return Err(CoreError::internal("substrate provisioning failed"));
        }
        let mut state = self.state.lock().await;
        state.created_projects.push(project.id.clone());
        Ok(KubernetesConfig {
            namespace: namespace(&project.id),
            worker_service_account: WORKER_SERVICE_ACCOUNT.to_string(),
            secrets: vec![PROJECT_SECRETS.to_string(), PROJECT_REGISTRY.to_string()],
        })
    }

    async fn delete_project(&self, project: &Project) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state.deleted_projects.push(project.id.clone());
        Ok(())
    }

    async fn schedule_worker(&self, event: &Event) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        if !state.scheduled_workers.contains(&event.id) {
            state.scheduled_workers.push(event.id.clone());
        }
        Ok(())
    }

    async fn unschedule_worker(&self, event: &Event) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state.scheduled_workers.retain(|id| id != &event.id);
        Ok(())
    }

    async fn start_worker(
        &self,
        _project: &Project,
        event: &Event,
        token: &str,
    ) -> Result<(), CoreError> {
        if self.fail_launches {
            return Err(CoreError::internal("substrate worker launch failed"));
        }
        let mut state = self.state.lock().await;
        state
            .started_workers
            .push((event.id.clone(), token.to_string()));
        Ok(())
    }

    async fn store_job_environment(
        &self,
        _project: &Project,
        event: &Event,
        job_name: &str,
        _spec: &JobSpec,
    ) -> Result<Vec<String>, CoreError> {
        let mut state = self.state.lock().await;
        state
            .stored_job_environments
            .push((event.id.clone(), job_name.to_string()));
        Ok(vec![job_secret(&event.id, job_name)])
    }

    async fn schedule_job(&self, event: &Event, job_name: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state
            .scheduled_jobs
            .push((event.id.clone(), job_name.to_string()));
        Ok(())
    }

    async fn start_job(
        &self,
        _project: &Project,
        event: &Event,
        job_name: &str,
    ) -> Result<(), CoreError> {
        if self.fail_launches {
            return Err(CoreError::internal("substrate job launch failed"));
        }
        let mut state = self.state.lock().await;
        state
            .started_jobs
            .push((event.id.clone(), job_name.to_string()));
        Ok(())
    }

    async fn count_running_workers(&self) -> Result<usize, CoreError> {
        Ok(self.state.lock().await.started_workers.len())
    }

    async fn count_running_jobs(&self) -> Result<usize, CoreError> {
        Ok(self.state.lock().await.started_jobs.len())
    }

    async fn delete_worker_and_jobs(
        &self,
        _project: &Project,
        event: &Event,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state.deleted_workers.push(event.id.clone());
        Ok(())
    }

    async fn get_logs(
        &self,
        _project: &Project,
        _event: &Event,
        _selector: &LogsSelector,
    ) -> Result<String, CoreError> {
        Ok(self.logs.clone())
    }
}

/// In-memory implementation of [`SecretsStore`] for tests.
#[derive(Default)]
pub struct MockSecretsStore {
    /// project id -> key -> value
    secrets: Arc<Mutex<HashMap<String, BTreeMap<String, String>>>>,
}

impl MockSecretsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw (unredacted) view, for assertions.
    pub async fn raw(&self, project_id: &str) -> BTreeMap<String, String> {
        self.secrets
            .lock()
            .await
            .get(project_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SecretsStore for MockSecretsStore {
    async fn list(&self, project: &Project) -> Result<Vec<Secret>, CoreError> {
        let secrets = self.secrets.lock().await;
        Ok(secrets
            .get(&project.id)
            .map(|entries| {
                entries
                    .keys()
                    .map(|key| Secret {
                        key: key.clone(),
                        value: REDACTED.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set(&self, project: &Project, secret: Secret) -> Result<(), CoreError> {
        let mut secrets = self.secrets.lock().await;
        secrets
            .entry(project.id.clone())
            .or_default()
            .insert(secret.key, secret.value);
        Ok(())
    }

    async fn unset(&self, project: &Project, key: &str) -> Result<(), CoreError> {
        let mut secrets = self.secrets.lock().await;
        if let Some(entries) = secrets.get_mut(&project.id) {
            entries.remove(key);
        }
        Ok(())
    }
}
