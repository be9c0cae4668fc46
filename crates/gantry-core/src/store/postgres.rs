// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed store implementations.
//!
//! Events and Projects are persisted as JSONB documents plus extracted filter
//! columns (`worker_phase`, `project_id`, `created_at`); identity records are
//! plain rows. Phase changes are single conditional UPDATEs so concurrent
//! writers serialize on the database and losers observe `Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use gantry_api::{
    Event, EventList, EventsSelector, Job, JobStatus, KubernetesConfig, ListOptions, Phase,
    PrincipalType, Project, Role, RoleAssignment, ServiceAccount, Session, SourceState, User,
    WorkerStatus,
};

use crate::error::CoreError;

use super::{
    EventsStore, HealthIndicator, ProjectsStore, RoleAssignmentsStore, ServiceAccountsStore,
    SessionsStore, UsersStore, decode_continue_token, encode_continue_token,
};

/// Postgres unique-violation error code.
const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

// ============================================================================
// Projects
// ============================================================================

/// PostgreSQL-backed implementation of [`ProjectsStore`].
#[derive(Clone)]
pub struct PostgresProjectsStore {
    pool: PgPool,
}

impl PostgresProjectsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    doc: Json<Project>,
}

#[async_trait]
impl ProjectsStore for PostgresProjectsStore {
    async fn create(&self, project: &Project) -> Result<(), CoreError> {
        let created = project.created.unwrap_or_else(Utc::now);
        let result = sqlx::query(
            r#"
            INSERT INTO projects (id, created_at, doc)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&project.id)
        .bind(created)
        .bind(Json(project))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(CoreError::conflict(
                "Project",
                &project.id,
                "a project with this id already exists",
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<Project>, CoreError> {
        let rows: Vec<ProjectRow> =
            sqlx::query_as("SELECT doc FROM projects ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.doc.0).collect())
    }

    async fn get(&self, id: &str) -> Result<Project, CoreError> {
        let row: Option<ProjectRow> = sqlx::query_as("SELECT doc FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.doc.0)
            .ok_or_else(|| CoreError::not_found("Project", id))
    }

    async fn update(&self, project: &Project) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE projects SET doc = $2 WHERE id = $1")
            .bind(&project.id)
            .bind(Json(project))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Project", &project.id));
        }
        Ok(())
    }

    async fn set_kubernetes(&self, id: &str, config: &KubernetesConfig) -> Result<(), CoreError> {
        let result =
            sqlx::query("UPDATE projects SET doc = jsonb_set(doc, '{kubernetes}', $2) WHERE id = $1")
                .bind(id)
                .bind(Json(config))
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Project", id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Project", id));
        }
        Ok(())
    }
}

// ============================================================================
// Events
// ============================================================================

/// PostgreSQL-backed implementation of [`EventsStore`].
#[derive(Clone)]
pub struct PostgresEventsStore {
    pool: PgPool,
}

impl PostgresEventsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    doc: Json<Event>,
}

#[async_trait]
impl EventsStore for PostgresEventsStore {
    async fn create(&self, event: &Event) -> Result<(), CoreError> {
        let created = event.created.unwrap_or_else(Utc::now);
        let result = sqlx::query(
            r#"
            INSERT INTO events (id, project_id, source, event_type, worker_phase, created_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&event.id)
        .bind(event.project_id.as_deref().unwrap_or_default())
        .bind(&event.source)
        .bind(&event.event_type)
        .bind(event.worker.status.phase.as_str())
        .bind(created)
        .bind(Json(event))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(CoreError::conflict(
                "Event",
                &event.id,
                "an event with this id already exists",
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &str) -> Result<Event, CoreError> {
        let row: Option<EventRow> = sqlx::query_as("SELECT doc FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.doc.0)
            .ok_or_else(|| CoreError::not_found("Event", id))
    }

    async fn get_by_hashed_worker_token(&self, hashed_token: &str) -> Result<Event, CoreError> {
        let row: Option<EventRow> =
            sqlx::query_as("SELECT doc FROM events WHERE hashed_worker_token = $1")
                .bind(hashed_token)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|r| r.doc.0)
            .ok_or_else(|| CoreError::not_found("Event", "<worker token>"))
    }

    async fn list(
        &self,
        selector: &EventsSelector,
        opts: &ListOptions,
    ) -> Result<EventList, CoreError> {
        let limit = opts.effective_limit();

        let mut qb = sqlx::QueryBuilder::new("SELECT doc FROM events WHERE TRUE");
        if let Some(project_id) = &selector.project_id {
            qb.push(" AND project_id = ").push_bind(project_id);
        }
        if !selector.worker_phases.is_empty() {
            let phases: Vec<String> = selector
                .worker_phases
                .iter()
                .map(|p| p.as_str().to_string())
                .collect();
            qb.push(" AND worker_phase = ANY(").push_bind(phases).push(")");
        }
        if let Some(token) = &opts.continue_token {
            let (created, id) = decode_continue_token(token)?;
            qb.push(" AND (created_at, id) < (")
                .push_bind(created)
                .push(", ")
                .push_bind(id)
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit + 1);

        let rows: Vec<EventRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let mut items: Vec<Event> = rows.into_iter().map(|r| r.doc.0).collect();

        let continue_token = if items.len() as i64 > limit {
            items.truncate(limit as usize);
            items.last().map(|e| {
                encode_continue_token(e.created.unwrap_or_else(Utc::now), &e.id)
            })
        } else {
            None
        };

        Ok(EventList {
            items,
            continue_token,
        })
    }

    async fn set_worker_token(&self, id: &str, hashed_token: &str) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE events SET hashed_worker_token = $2 WHERE id = $1")
            .bind(id)
            .bind(hashed_token)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Event", id));
        }
        Ok(())
    }

    async fn update_worker_status(
        &self,
        id: &str,
        expected: Phase,
        status: &WorkerStatus,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET doc = jsonb_set(doc, '{worker,status}', $3),
                worker_phase = $4
            WHERE id = $1 AND worker_phase = $2
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(Json(status))
        .bind(status.phase.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a vanished event from a lost race.
            let _ = self.get(id).await?;
            return Err(CoreError::conflict(
                "Worker",
                id,
                format!("worker is no longer in phase {expected}"),
            ));
        }
        Ok(())
    }

    async fn update_source_state(&self, id: &str, state: &SourceState) -> Result<(), CoreError> {
        let result =
            sqlx::query("UPDATE events SET doc = jsonb_set(doc, '{sourceState}', $2) WHERE id = $1")
                .bind(id)
                .bind(Json(state))
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Event", id));
        }
        Ok(())
    }

    async fn create_job(&self, event_id: &str, name: &str, job: &Job) -> Result<(), CoreError> {
        // Single conditional update: worker must be RUNNING and the name
        // unused. jsonb_set cannot create the intermediate jobs object, so
        // the map is coalesced in.
        let result = sqlx::query(
            r#"
            UPDATE events
            SET doc = jsonb_set(
                doc,
                '{worker,jobs}',
                coalesce(doc #> '{worker,jobs}', '{}'::jsonb) || jsonb_build_object($2::text, $3::jsonb)
            )
            WHERE id = $1
              AND worker_phase = 'RUNNING'
              AND NOT coalesce(doc #> '{worker,jobs}' ? $2, false)
            "#,
        )
        .bind(event_id)
        .bind(name)
        .bind(Json(job))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let event = self.get(event_id).await?;
            if event.worker.jobs.contains_key(name) {
                return Err(CoreError::conflict(
                    "Job",
                    name,
                    "a job with this name already exists",
                ));
            }
            return Err(CoreError::conflict(
                "Worker",
                event_id,
                "jobs may only be created while the worker is RUNNING",
            ));
        }
        Ok(())
    }

    async fn update_job_status(
        &self,
        event_id: &str,
        name: &str,
        expected: Phase,
        status: &JobStatus,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET doc = jsonb_set(doc, ARRAY['worker','jobs',$2,'status']::text[], $4)
            WHERE id = $1
              AND doc #>> ARRAY['worker','jobs',$2,'status','phase']::text[] = $3
            "#,
        )
        .bind(event_id)
        .bind(name)
        .bind(expected.as_str())
        .bind(Json(status))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let event = self.get(event_id).await?;
            if !event.worker.jobs.contains_key(name) {
                return Err(CoreError::not_found("Job", name));
            }
            return Err(CoreError::conflict(
                "Job",
                name,
                format!("job is no longer in phase {expected}"),
            ));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Event", id));
        }
        Ok(())
    }

    async fn list_by_project(&self, project_id: &str) -> Result<Vec<Event>, CoreError> {
        let rows: Vec<EventRow> =
            sqlx::query_as("SELECT doc FROM events WHERE project_id = $1 ORDER BY created_at")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|r| r.doc.0).collect())
    }

    async fn delete_by_project(&self, project_id: &str) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM events WHERE project_id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Users
// ============================================================================

/// PostgreSQL-backed implementation of [`UsersStore`].
#[derive(Clone)]
pub struct PostgresUsersStore {
    pool: PgPool,
}

impl PostgresUsersStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    created_at: DateTime<Utc>,
    locked_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            created: Some(row.created_at),
            locked: row.locked_at,
        }
    }
}

#[async_trait]
impl UsersStore for PostgresUsersStore {
    async fn upsert(&self, user: &User) -> Result<User, CoreError> {
        let created = user.created.unwrap_or_else(Utc::now);
        sqlx::query(
            r#"
            INSERT INTO users (id, created_at)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&user.id)
        .bind(created)
        .execute(&self.pool)
        .await?;
        self.get(&user.id).await
    }

    async fn get(&self, id: &str) -> Result<User, CoreError> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, created_at, locked_at FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(User::from)
            .ok_or_else(|| CoreError::not_found("User", id))
    }

    async fn list(&self) -> Result<Vec<User>, CoreError> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, created_at, locked_at FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("User", id));
        }
        Ok(())
    }

    async fn set_locked(&self, id: &str, locked: Option<DateTime<Utc>>) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE users SET locked_at = $2 WHERE id = $1")
            .bind(id)
            .bind(locked)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("User", id));
        }
        Ok(())
    }
}

// ============================================================================
// Service Accounts
// ============================================================================

/// PostgreSQL-backed implementation of [`ServiceAccountsStore`].
#[derive(Clone)]
pub struct PostgresServiceAccountsStore {
    pool: PgPool,
}

impl PostgresServiceAccountsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ServiceAccountRow {
    id: String,
    description: String,
    created_at: DateTime<Utc>,
    locked_at: Option<DateTime<Utc>>,
}

impl From<ServiceAccountRow> for ServiceAccount {
    fn from(row: ServiceAccountRow) -> Self {
        ServiceAccount {
            id: row.id,
            description: (!row.description.is_empty()).then_some(row.description),
            created: Some(row.created_at),
            locked: row.locked_at,
        }
    }
}

#[async_trait]
impl ServiceAccountsStore for PostgresServiceAccountsStore {
    async fn create(
        &self,
        service_account: &ServiceAccount,
        hashed_token: &str,
    ) -> Result<(), CoreError> {
        let created = service_account.created.unwrap_or_else(Utc::now);
        let result = sqlx::query(
            r#"
            INSERT INTO service_accounts (id, description, hashed_token, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&service_account.id)
        .bind(service_account.description.as_deref().unwrap_or_default())
        .bind(hashed_token)
        .bind(created)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(CoreError::conflict(
                "ServiceAccount",
                &service_account.id,
                "a service account with this id already exists",
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &str) -> Result<ServiceAccount, CoreError> {
        let row: Option<ServiceAccountRow> = sqlx::query_as(
            "SELECT id, description, created_at, locked_at FROM service_accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ServiceAccount::from)
            .ok_or_else(|| CoreError::not_found("ServiceAccount", id))
    }

    async fn get_by_hashed_token(&self, hashed_token: &str) -> Result<ServiceAccount, CoreError> {
        let row: Option<ServiceAccountRow> = sqlx::query_as(
            r#"
            SELECT id, description, created_at, locked_at
            FROM service_accounts
            WHERE hashed_token = $1
            "#,
        )
        .bind(hashed_token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ServiceAccount::from)
            .ok_or_else(|| CoreError::not_found("ServiceAccount", "<token>"))
    }

    async fn list(&self) -> Result<Vec<ServiceAccount>, CoreError> {
        let rows: Vec<ServiceAccountRow> = sqlx::query_as(
            "SELECT id, description, created_at, locked_at FROM service_accounts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ServiceAccount::from).collect())
    }

    async fn set_locked(&self, id: &str, locked: Option<DateTime<Utc>>) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE service_accounts SET locked_at = $2 WHERE id = $1")
            .bind(id)
            .bind(locked)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("ServiceAccount", id));
        }
        Ok(())
    }

    async fn set_token(&self, id: &str, hashed_token: &str) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE service_accounts SET hashed_token = $2 WHERE id = $1")
            .bind(id)
            .bind(hashed_token)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("ServiceAccount", id));
        }
        Ok(())
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// PostgreSQL-backed implementation of [`SessionsStore`].
#[derive(Clone)]
pub struct PostgresSessionsStore {
    pool: PgPool,
}

impl PostgresSessionsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    root: bool,
    user_id: Option<String>,
    authenticated: bool,
    hashed_oidc_state: Option<String>,
    hashed_token: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            root: row.root,
            user_id: row.user_id,
            authenticated: row.authenticated,
            hashed_oidc_state: row.hashed_oidc_state,
            hashed_token: row.hashed_token,
            created: row.created_at,
            expires: row.expires_at,
        }
    }
}

const SESSION_COLUMNS: &str =
    "id, root, user_id, authenticated, hashed_oidc_state, hashed_token, created_at, expires_at";

#[async_trait]
impl SessionsStore for PostgresSessionsStore {
    async fn create(&self, session: &Session) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO sessions
                (id, root, user_id, authenticated, hashed_oidc_state, hashed_token,
                 created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&session.id)
        .bind(session.root)
        .bind(&session.user_id)
        .bind(session.authenticated)
        .bind(&session.hashed_oidc_state)
        .bind(&session.hashed_token)
        .bind(session.created)
        .bind(session.expires)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(CoreError::conflict(
                "Session",
                &session.id,
                "a session with this token already exists",
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_by_hashed_token(&self, hashed_token: &str) -> Result<Session, CoreError> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE hashed_token = $1");
        let row: Option<SessionRow> = sqlx::query_as(&query)
            .bind(hashed_token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Session::from)
            .ok_or_else(|| CoreError::not_found("Session", "<token>"))
    }

    async fn get_by_hashed_oidc_state(&self, hashed_state: &str) -> Result<Session, CoreError> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE hashed_oidc_state = $1 AND NOT authenticated"
        );
        let row: Option<SessionRow> = sqlx::query_as(&query)
            .bind(hashed_state)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Session::from)
            .ok_or_else(|| CoreError::not_found("Session", "<oidc state>"))
    }

    async fn authenticate(
        &self,
        id: &str,
        user_id: &str,
        expires: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET user_id = $2, authenticated = TRUE, expires_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(expires)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Session", id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Session", id));
        }
        Ok(())
    }

    async fn delete_by_user(&self, user_id: &str) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Role Assignments
// ============================================================================

/// PostgreSQL-backed implementation of [`RoleAssignmentsStore`].
#[derive(Clone)]
pub struct PostgresRoleAssignmentsStore {
    pool: PgPool,
}

impl PostgresRoleAssignmentsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RoleAssignmentRow {
    principal_type: String,
    principal_id: String,
    role_name: String,
    role_scope: String,
}

impl TryFrom<RoleAssignmentRow> for RoleAssignment {
    type Error = CoreError;

    fn try_from(row: RoleAssignmentRow) -> Result<Self, CoreError> {
        let principal_type = PrincipalType::parse(&row.principal_type).ok_or_else(|| {
            CoreError::internal(format!("unknown principal type {:?}", row.principal_type))
        })?;
        Ok(RoleAssignment {
            principal_type,
            principal_id: row.principal_id,
            role: Role::new(&row.role_name, &row.role_scope),
        })
    }
}

#[async_trait]
impl RoleAssignmentsStore for PostgresRoleAssignmentsStore {
    async fn grant(&self, assignment: &RoleAssignment) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO role_assignments (principal_type, principal_id, role_name, role_scope)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (principal_type, principal_id, role_name, role_scope) DO NOTHING
            "#,
        )
        .bind(assignment.principal_type.as_str())
        .bind(&assignment.principal_id)
        .bind(&assignment.role.name)
        .bind(&assignment.role.scope)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke(&self, assignment: &RoleAssignment) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM role_assignments
            WHERE principal_type = $1 AND principal_id = $2
              AND role_name = $3 AND role_scope = $4
            "#,
        )
        .bind(assignment.principal_type.as_str())
        .bind(&assignment.principal_id)
        .bind(&assignment.role.name)
        .bind(&assignment.role.scope)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(
                "RoleAssignment",
                &assignment.principal_id,
            ));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<RoleAssignment>, CoreError> {
        let rows: Vec<RoleAssignmentRow> = sqlx::query_as(
            r#"
            SELECT principal_type, principal_id, role_name, role_scope
            FROM role_assignments
            ORDER BY principal_type, principal_id, role_name, role_scope
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RoleAssignment::try_from).collect()
    }

    async fn list_for_principal(
        &self,
        principal_type: PrincipalType,
        principal_id: &str,
    ) -> Result<Vec<RoleAssignment>, CoreError> {
        let rows: Vec<RoleAssignmentRow> = sqlx::query_as(
            r#"
            SELECT principal_type, principal_id, role_name, role_scope
            FROM role_assignments
            WHERE principal_type = $1 AND principal_id = $2
            "#,
        )
        .bind(principal_type.as_str())
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RoleAssignment::try_from).collect()
    }

    async fn revoke_all_for_principal(
        &self,
        principal_type: PrincipalType,
        principal_id: &str,
    ) -> Result<u64, CoreError> {
        let result = sqlx::query(
            "DELETE FROM role_assignments WHERE principal_type = $1 AND principal_id = $2",
        )
        .bind(principal_type.as_str())
        .bind(principal_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// Health
// ============================================================================

/// Database liveness probe backing the health endpoint.
#[derive(Clone)]
pub struct PostgresHealthIndicator {
    pool: PgPool,
}

impl PostgresHealthIndicator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthIndicator for PostgresHealthIndicator {
    async fn healthy(&self) -> bool {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}
