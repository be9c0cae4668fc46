// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory store implementations for tests.
//!
//! These mirror the PostgreSQL backends' semantics exactly -- including the
//! compare-and-set behavior of phase updates and the pagination contract --
//! so services can be exercised without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use gantry_api::{
    Event, EventList, EventsSelector, Job, JobStatus, KubernetesConfig, ListOptions, Phase,
    PrincipalType, Project, RoleAssignment, ServiceAccount, Session, SourceState, User,
    WorkerStatus,
};

use crate::error::CoreError;

use super::{
    EventsStore, HealthIndicator, ProjectsStore, RoleAssignmentsStore, ServiceAccountsStore,
    SessionsStore, UsersStore, decode_continue_token, encode_continue_token,
};

/// In-memory implementation of [`ProjectsStore`].
#[derive(Default)]
pub struct MemoryProjectsStore {
    projects: Arc<Mutex<HashMap<String, Project>>>,
}

impl MemoryProjectsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectsStore for MemoryProjectsStore {
    async fn create(&self, project: &Project) -> Result<(), CoreError> {
        let mut projects = self.projects.lock().await;
        if projects.contains_key(&project.id) {
            return Err(CoreError::conflict(
                "Project",
                &project.id,
                "a project with this id already exists",
            ));
        }
        projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Project>, CoreError> {
        let projects = self.projects.lock().await;
        let mut items: Vec<Project> = projects.values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn get(&self, id: &str) -> Result<Project, CoreError> {
        let projects = self.projects.lock().await;
        projects
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Project", id))
    }

    async fn update(&self, project: &Project) -> Result<(), CoreError> {
        let mut projects = self.projects.lock().await;
        match projects.get_mut(&project.id) {
            Some(stored) => {
                *stored = project.clone();
                Ok(())
            }
            None => Err(CoreError::not_found("Project", &project.id)),
        }
    }

    async fn set_kubernetes(&self, id: &str, config: &KubernetesConfig) -> Result<(), CoreError> {
        let mut projects = self.projects.lock().await;
        match projects.get_mut(id) {
            Some(stored) => {
                stored.kubernetes = Some(config.clone());
                Ok(())
            }
            None => Err(CoreError::not_found("Project", id)),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let mut projects = self.projects.lock().await;
        projects
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("Project", id))
    }
}

/// In-memory implementation of [`EventsStore`].
#[derive(Default)]
pub struct MemoryEventsStore {
    inner: Arc<Mutex<EventsInner>>,
}

#[derive(Default)]
struct EventsInner {
    events: HashMap<String, Event>,
    /// hashed worker token -> event id
    worker_tokens: HashMap<String, String>,
}

impl MemoryEventsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventsStore for MemoryEventsStore {
    async fn create(&self, event: &Event) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        if inner.events.contains_key(&event.id) {
            return Err(CoreError::conflict(
                "Event",
                &event.id,
                "an event with this id already exists",
            ));
        }
        inner.events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Event, CoreError> {
        let inner = self.inner.lock().await;
        inner
            .events
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Event", id))
    }

    async fn get_by_hashed_worker_token(&self, hashed_token: &str) -> Result<Event, CoreError> {
        let inner = self.inner.lock().await;
        inner
            .worker_tokens
            .get(hashed_token)
            .and_then(|id| inner.events.get(id))
            .cloned()
            .ok_or_else(|| CoreError::not_found("Event", "<worker token>"))
    }

    async fn list(
        &self,
        selector: &EventsSelector,
        opts: &ListOptions,
    ) -> Result<EventList, CoreError> {
        let limit = opts.effective_limit() as usize;
        let inner = self.inner.lock().await;

        let mut items: Vec<Event> = inner
            .events
            .values()
            .filter(|e| match &selector.project_id {
                Some(project_id) => e.project_id.as_deref() == Some(project_id),
                None => true,
            })
            .filter(|e| {
                selector.worker_phases.is_empty()
                    || selector.worker_phases.contains(&e.worker.status.phase)
            })
            .cloned()
            .collect();
        // Newest first, matching the database ordering.
        items.sort_by(|a, b| (b.created, &b.id).cmp(&(a.created, &a.id)));

        if let Some(token) = &opts.continue_token {
            let (created, id) = decode_continue_token(token)?;
            // Compare at microsecond precision, matching the token encoding.
            items.retain(|e| {
                let micros = e
                    .created
                    .map(|c| c.timestamp_micros())
                    .unwrap_or(i64::MIN);
                (micros, e.id.as_str()) < (created.timestamp_micros(), id.as_str())
            });
        }

        let continue_token = if items.len() > limit {
            items.truncate(limit);
            items
                .last()
                .map(|e| encode_continue_token(e.created.unwrap_or_else(Utc::now), &e.id))
        } else {
            None
        };

        Ok(EventList {
            items,
            continue_token,
        })
    }

    async fn set_worker_token(&self, id: &str, hashed_token: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.events.contains_key(id) {
            return Err(CoreError::not_found("Event", id));
        }
        inner
            .worker_tokens
            .insert(hashed_token.to_string(), id.to_string());
        Ok(())
    }

    async fn update_worker_status(
        &self,
        id: &str,
        expected: Phase,
        status: &WorkerStatus,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        let event = inner
            .events
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Event", id))?;
        if event.worker.status.phase != expected {
            return Err(CoreError::conflict(
                "Worker",
                id,
                format!("worker is no longer in phase {expected}"),
            ));
        }
        event.worker.status = status.clone();
        Ok(())
    }

    async fn update_source_state(&self, id: &str, state: &SourceState) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        let event = inner
            .events
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Event", id))?;
        event.source_state = Some(state.clone());
        Ok(())
    }

    async fn create_job(&self, event_id: &str, name: &str, job: &Job) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        let event = inner
            .events
            .get_mut(event_id)
            .ok_or_else(|| CoreError::not_found("Event", event_id))?;
        if event.worker.jobs.contains_key(name) {
            return Err(CoreError::conflict(
                "Job",
                name,
                "a job with this name already exists",
            ));
        }
        if event.worker.status.phase != Phase::Running {
            return Err(CoreError::conflict(
                "Worker",
                event_id,
                "jobs may only be created while the worker is RUNNING",
            ));
        }
        event.worker.jobs.insert(name.to_string(), job.clone());
        Ok(())
    }

    async fn update_job_status(
        &self,
        event_id: &str,
        name: &str,
        expected: Phase,
        status: &JobStatus,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        let event = inner
            .events
            .get_mut(event_id)
            .ok_or_else(|| CoreError::not_found("Event", event_id))?;
        let job = event
            .worker
            .jobs
            .get_mut(name)
            .ok_or_else(|| CoreError::not_found("Job", name))?;
        if job.status.phase != expected {
            return Err(CoreError::conflict(
                "Job",
                name,
                format!("job is no longer in phase {expected}"),
            ));
        }
        job.status = status.clone();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        if inner.events.remove(id).is_none() {
            return Err(CoreError::not_found("Event", id));
        }
        inner.worker_tokens.retain(|_, event_id| event_id != id);
        Ok(())
    }

    async fn list_by_project(&self, project_id: &str) -> Result<Vec<Event>, CoreError> {
        let inner = self.inner.lock().await;
        let mut items: Vec<Event> = inner
            .events
            .values()
            .filter(|e| e.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect();
        items.sort_by(|a, b| (a.created, &a.id).cmp(&(b.created, &b.id)));
        Ok(items)
    }

    async fn delete_by_project(&self, project_id: &str) -> Result<u64, CoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.events.len();
        inner
            .events
            .retain(|_, e| e.project_id.as_deref() != Some(project_id));
        let removed = before - inner.events.len();
        let remaining: Vec<String> = inner.events.keys().cloned().collect();
        inner
            .worker_tokens
            .retain(|_, event_id| remaining.contains(event_id));
        Ok(removed as u64)
    }
}

/// In-memory implementation of [`UsersStore`].
#[derive(Default)]
pub struct MemoryUsersStore {
    users: Arc<Mutex<HashMap<String, User>>>,
}

impl MemoryUsersStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsersStore for MemoryUsersStore {
    async fn upsert(&self, user: &User) -> Result<User, CoreError> {
        let mut users = self.users.lock().await;
        let stored = users.entry(user.id.clone()).or_insert_with(|| {
            let mut user = user.clone();
            user.created = Some(user.created.unwrap_or_else(Utc::now));
            user
        });
        Ok(stored.clone())
    }

    async fn get(&self, id: &str) -> Result<User, CoreError> {
        let users = self.users.lock().await;
        users
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("User", id))
    }

    async fn list(&self) -> Result<Vec<User>, CoreError> {
        let users = self.users.lock().await;
        let mut items: Vec<User> = users.values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let mut users = self.users.lock().await;
        users
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("User", id))
    }

    async fn set_locked(&self, id: &str, locked: Option<DateTime<Utc>>) -> Result<(), CoreError> {
        let mut users = self.users.lock().await;
        match users.get_mut(id) {
            Some(user) => {
                user.locked = locked;
                Ok(())
            }
            None => Err(CoreError::not_found("User", id)),
        }
    }
}

/// In-memory implementation of [`ServiceAccountsStore`].
#[derive(Default)]
pub struct MemoryServiceAccountsStore {
    inner: Arc<Mutex<ServiceAccountsInner>>,
}

#[derive(Default)]
struct ServiceAccountsInner {
    accounts: HashMap<String, ServiceAccount>,
    /// hashed token -> service account id
    tokens: HashMap<String, String>,
}

impl MemoryServiceAccountsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceAccountsStore for MemoryServiceAccountsStore {
    async fn create(
        &self,
        service_account: &ServiceAccount,
        hashed_token: &str,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        if inner.accounts.contains_key(&service_account.id) {
            return Err(CoreError::conflict(
                "ServiceAccount",
                &service_account.id,
                "a service account with this id already exists",
            ));
        }
        inner
            .accounts
            .insert(service_account.id.clone(), service_account.clone());
        inner
            .tokens
            .insert(hashed_token.to_string(), service_account.id.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<ServiceAccount, CoreError> {
        let inner = self.inner.lock().await;
        inner
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("ServiceAccount", id))
    }

    async fn get_by_hashed_token(&self, hashed_token: &str) -> Result<ServiceAccount, CoreError> {
        let inner = self.inner.lock().await;
        inner
            .tokens
            .get(hashed_token)
            .and_then(|id| inner.accounts.get(id))
            .cloned()
            .ok_or_else(|| CoreError::not_found("ServiceAccount", "<token>"))
    }

    async fn list(&self) -> Result<Vec<ServiceAccount>, CoreError> {
        let inner = self.inner.lock().await;
        let mut items: Vec<ServiceAccount> = inner.accounts.values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn set_locked(&self, id: &str, locked: Option<DateTime<Utc>>) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        match inner.accounts.get_mut(id) {
            Some(account) => {
                account.locked = locked;
                Ok(())
            }
            None => Err(CoreError::not_found("ServiceAccount", id)),
        }
    }

    async fn set_token(&self, id: &str, hashed_token: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.accounts.contains_key(id) {
            return Err(CoreError::not_found("ServiceAccount", id));
        }
        inner.tokens.retain(|_, account_id| account_id != id);
        inner.tokens.insert(hashed_token.to_string(), id.to_string());
        Ok(())
    }
}

/// In-memory implementation of [`SessionsStore`].
#[derive(Default)]
pub struct MemorySessionsStore {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
}

impl MemorySessionsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionsStore for MemorySessionsStore {
    async fn create(&self, session: &Session) -> Result<(), CoreError> {
        let mut sessions = self.sessions.lock().await;
        if sessions
            .values()
            .any(|s| s.hashed_token == session.hashed_token)
        {
            return Err(CoreError::conflict(
                "Session",
                &session.id,
                "a session with this token already exists",
            ));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_by_hashed_token(&self, hashed_token: &str) -> Result<Session, CoreError> {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .find(|s| s.hashed_token == hashed_token)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Session", "<token>"))
    }

    async fn get_by_hashed_oidc_state(&self, hashed_state: &str) -> Result<Session, CoreError> {
        let sessions = self.sessions.lock().await;
        sessions
            .values()
            .find(|s| !s.authenticated && s.hashed_oidc_state.as_deref() == Some(hashed_state))
            .cloned()
            .ok_or_else(|| CoreError::not_found("Session", "<oidc state>"))
    }

    async fn authenticate(
        &self,
        id: &str,
        user_id: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(id) {
            Some(session) => {
                session.user_id = Some(user_id.to_string());
                session.authenticated = true;
                session.expires = expires;
                Ok(())
            }
            None => Err(CoreError::not_found("Session", id)),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("Session", id))
    }

    async fn delete_by_user(&self, user_id: &str) -> Result<u64, CoreError> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id.as_deref() != Some(user_id));
        Ok((before - sessions.len()) as u64)
    }
}

/// In-memory implementation of [`RoleAssignmentsStore`].
#[derive(Default)]
pub struct MemoryRoleAssignmentsStore {
    assignments: Arc<Mutex<Vec<RoleAssignment>>>,
}

impl MemoryRoleAssignmentsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleAssignmentsStore for MemoryRoleAssignmentsStore {
    async fn grant(&self, assignment: &RoleAssignment) -> Result<(), CoreError> {
        let mut assignments = self.assignments.lock().await;
        if !assignments.contains(assignment) {
            assignments.push(assignment.clone());
        }
        Ok(())
    }

    async fn revoke(&self, assignment: &RoleAssignment) -> Result<(), CoreError> {
        let mut assignments = self.assignments.lock().await;
        let before = assignments.len();
        assignments.retain(|a| a != assignment);
        if assignments.len() == before {
            return Err(CoreError::not_found(
                "RoleAssignment",
                &assignment.principal_id,
            ));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RoleAssignment>, CoreError> {
        Ok(self.assignments.lock().await.clone())
    }

    async fn list_for_principal(
        &self,
        principal_type: PrincipalType,
        principal_id: &str,
    ) -> Result<Vec<RoleAssignment>, CoreError> {
        let assignments = self.assignments.lock().await;
        Ok(assignments
            .iter()
            .filter(|a| a.principal_type == principal_type && a.principal_id == principal_id)
            .cloned()
            .collect())
    }

    async fn revoke_all_for_principal(
        &self,
        principal_type: PrincipalType,
        principal_id: &str,
    ) -> Result<u64, CoreError> {
        let mut assignments = self.assignments.lock().await;
        let before = assignments.len();
        assignments
            .retain(|a| !(a.principal_type == principal_type && a.principal_id == principal_id));
        Ok((before - assignments.len()) as u64)
    }
}

/// Health indicator that always reports healthy; backs tests.
pub struct StaticHealthIndicator;

#[async_trait]
impl HealthIndicator for StaticHealthIndicator {
    async fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_api::Worker;

    fn event(id: &str, project_id: &str) -> Event {
        Event {
            id: id.to_string(),
            project_id: Some(project_id.to_string()),
            source: "forge.sh/cli".to_string(),
            event_type: "exec".to_string(),
            created: Some(Utc::now()),
            worker: Worker::default(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_worker_phase_compare_and_set() {
        let store = MemoryEventsStore::new();
        store.create(&event("e1", "p1")).await.unwrap();

        let status = WorkerStatus {
            phase: Phase::Starting,
            started: None,
            ended: None,
        };
        store
            .update_worker_status("e1", Phase::Pending, &status)
            .await
            .unwrap();

        // Expecting the old phase now loses.
        let err = store
            .update_worker_status("e1", Phase::Pending, &status)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[tokio::test]
    async fn test_event_list_pagination() {
        let store = MemoryEventsStore::new();
        for i in 0..5 {
            let mut e = event(&format!("e{i}"), "p1");
            e.created = Some(Utc::now() + chrono::TimeDelta::seconds(i));
            store.create(&e).await.unwrap();
        }

        let opts = ListOptions {
            limit: Some(2),
            ..Default::default()
        };
        let page = store
            .list(&EventsSelector::default(), &opts)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, "e4");
        let token = page.continue_token.expect("more pages");

        let page = store
            .list(
                &EventsSelector::default(),
                &ListOptions {
                    continue_token: Some(token),
                    limit: Some(10),
                },
            )
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.continue_token.is_none());
    }

    #[tokio::test]
    async fn test_job_create_requires_running_worker() {
        let store = MemoryEventsStore::new();
        store.create(&event("e1", "p1")).await.unwrap();

        let err = store
            .create_job("e1", "build", &Job::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
    }
}
