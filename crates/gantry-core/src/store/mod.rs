// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Store interfaces and backends for gantry-core.
//!
//! Each store trait is defined by exactly the operations the domain services
//! need and has two implementations: PostgreSQL for persistence and
//! in-memory for tests. Document types (Events, Projects) are persisted as
//! JSONB alongside extracted filter columns; identity types are plain rows.
//!
//! The conditional-update discipline lives here: every worker/job phase
//! change names the phase it expects to replace and surfaces `Conflict` when
//! the stored phase has moved on.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gantry_api::{
    Event, EventList, EventsSelector, Job, JobStatus, KubernetesConfig, ListOptions, Phase,
    PrincipalType, Project, RoleAssignment, ServiceAccount, Session, SourceState, User,
    WorkerStatus,
};

use crate::error::CoreError;

/// Persistence for Projects.
#[async_trait]
pub trait ProjectsStore: Send + Sync {
    /// Insert a new Project. Fails with `Conflict` when the ID is taken.
    async fn create(&self, project: &Project) -> Result<(), CoreError>;

    async fn list(&self) -> Result<Vec<Project>, CoreError>;

    async fn get(&self, id: &str) -> Result<Project, CoreError>;

    /// Replace the stored document. The caller is responsible for preserving
    /// the immutable `kubernetes` block.
    async fn update(&self, project: &Project) -> Result<(), CoreError>;

    /// Record the substrate resources provisioned for the Project.
    async fn set_kubernetes(&self, id: &str, config: &KubernetesConfig) -> Result<(), CoreError>;

    async fn delete(&self, id: &str) -> Result<(), CoreError>;
}

/// Persistence for Events, including the embedded Worker and Jobs
/// sub-documents.
#[async_trait]
pub trait EventsStore: Send + Sync {
    async fn create(&self, event: &Event) -> Result<(), CoreError>;

    async fn get(&self, id: &str) -> Result<Event, CoreError>;

    /// Resolve a worker bearer token (pre-hashed) to its Event.
    async fn get_by_hashed_worker_token(&self, hashed_token: &str) -> Result<Event, CoreError>;

    async fn list(
        &self,
        selector: &EventsSelector,
        opts: &ListOptions,
    ) -> Result<EventList, CoreError>;

    /// Store the hash of the per-event worker token. Issued once, on the
    /// PENDING -> STARTING transition.
    async fn set_worker_token(&self, id: &str, hashed_token: &str) -> Result<(), CoreError>;

    /// Compare-and-set the worker status: applies only while the stored
    /// phase equals `expected`, otherwise fails with `Conflict`.
    async fn update_worker_status(
        &self,
        id: &str,
        expected: Phase,
        status: &WorkerStatus,
    ) -> Result<(), CoreError>;

    async fn update_source_state(&self, id: &str, state: &SourceState) -> Result<(), CoreError>;

    /// Insert a Job under the Event's worker. Applies only while the worker
    /// is RUNNING and the name is unused; fails with `Conflict` otherwise.
    async fn create_job(&self, event_id: &str, name: &str, job: &Job) -> Result<(), CoreError>;

    /// Compare-and-set a Job's status, mirroring `update_worker_status`.
    async fn update_job_status(
        &self,
        event_id: &str,
        name: &str,
        expected: Phase,
        status: &JobStatus,
    ) -> Result<(), CoreError>;

    async fn delete(&self, id: &str) -> Result<(), CoreError>;

    async fn list_by_project(&self, project_id: &str) -> Result<Vec<Event>, CoreError>;

    /// Remove all Events belonging to a Project; returns how many were
    /// removed.
    async fn delete_by_project(&self, project_id: &str) -> Result<u64, CoreError>;
}

/// Persistence for Users.
#[async_trait]
pub trait UsersStore: Send + Sync {
    /// Insert the User if absent; returns the stored record either way.
    /// Users are created implicitly on first OIDC login.
    async fn upsert(&self, user: &User) -> Result<User, CoreError>;

    async fn get(&self, id: &str) -> Result<User, CoreError>;

    async fn list(&self) -> Result<Vec<User>, CoreError>;

    async fn delete(&self, id: &str) -> Result<(), CoreError>;

    /// Set or clear the lock timestamp.
    async fn set_locked(&self, id: &str, locked: Option<DateTime<Utc>>) -> Result<(), CoreError>;
}

/// Persistence for ServiceAccounts. Raw tokens never reach this layer.
#[async_trait]
pub trait ServiceAccountsStore: Send + Sync {
    async fn create(
        &self,
        service_account: &ServiceAccount,
        hashed_token: &str,
    ) -> Result<(), CoreError>;

    async fn get(&self, id: &str) -> Result<ServiceAccount, CoreError>;

    async fn get_by_hashed_token(&self, hashed_token: &str) -> Result<ServiceAccount, CoreError>;

    async fn list(&self) -> Result<Vec<ServiceAccount>, CoreError>;

    async fn set_locked(&self, id: &str, locked: Option<DateTime<Utc>>) -> Result<(), CoreError>;

    /// Replace the stored token hash (unlock rotates the token).
    async fn set_token(&self, id: &str, hashed_token: &str) -> Result<(), CoreError>;
}

/// Persistence for Sessions.
#[async_trait]
pub trait SessionsStore: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), CoreError>;

    async fn get_by_hashed_token(&self, hashed_token: &str) -> Result<Session, CoreError>;

    /// Look up a pending OIDC login flow by the hash of its state string.
    async fn get_by_hashed_oidc_state(&self, hashed_state: &str) -> Result<Session, CoreError>;

    /// Promote a pending session: bind it to the user and mark it
    /// authenticated with a fresh expiry.
    async fn authenticate(
        &self,
        id: &str,
        user_id: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    async fn delete(&self, id: &str) -> Result<(), CoreError>;

    /// Invalidate every session belonging to a user; returns how many were
    /// removed.
    async fn delete_by_user(&self, user_id: &str) -> Result<u64, CoreError>;
}

/// Persistence for RoleAssignments.
#[async_trait]
pub trait RoleAssignmentsStore: Send + Sync {
    /// Record the assignment. Granting an existing assignment is a no-op.
    async fn grant(&self, assignment: &RoleAssignment) -> Result<(), CoreError>;

    /// Remove the assignment. Fails with `NotFound` when it does not exist.
    async fn revoke(&self, assignment: &RoleAssignment) -> Result<(), CoreError>;

    async fn list(&self) -> Result<Vec<RoleAssignment>, CoreError>;

    async fn list_for_principal(
        &self,
        principal_type: PrincipalType,
        principal_id: &str,
    ) -> Result<Vec<RoleAssignment>, CoreError>;

    /// Remove every assignment held by a principal; returns how many were
    /// removed.
    async fn revoke_all_for_principal(
        &self,
        principal_type: PrincipalType,
        principal_id: &str,
    ) -> Result<u64, CoreError>;
}

/// Liveness probe over the persistence backend, for the health endpoint.
#[async_trait]
pub trait HealthIndicator: Send + Sync {
    async fn healthy(&self) -> bool;
}

/// Encode the continuation token for event list pagination.
///
/// The token is opaque to clients: `<created micros>:<id>` of the last item
/// on the page (URL-safe, no percent-encoding needed).
pub(crate) fn encode_continue_token(created: DateTime<Utc>, id: &str) -> String {
    format!("{}:{}", created.timestamp_micros(), id)
}

/// Decode a continuation token produced by [`encode_continue_token`].
pub(crate) fn decode_continue_token(token: &str) -> Result<(DateTime<Utc>, String), CoreError> {
    let (micros, id) = token
        .split_once(':')
        .ok_or_else(|| CoreError::bad_request("malformed continue token"))?;
    let micros: i64 = micros
        .parse()
        .map_err(|_| CoreError::bad_request("malformed continue token"))?;
    let created = DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| CoreError::bad_request("malformed continue token"))?;
    Ok((created, id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continue_token_round_trip() {
        let created = Utc::now();
        let token = encode_continue_token(created, "01ARZ3NDEKTSV4RRFFQ69G5FAV");
        let (decoded_created, decoded_id) = decode_continue_token(&token).unwrap();
        assert_eq!(decoded_created.timestamp_micros(), created.timestamp_micros());
        assert_eq!(decoded_id, "01ARZ3NDEKTSV4RRFFQ69G5FAV");
    }

    #[test]
    fn test_malformed_continue_token() {
        assert!(decode_continue_token("junk").is_err());
        assert!(decode_continue_token("abc|def").is_err());
    }
}
