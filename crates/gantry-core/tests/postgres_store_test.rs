// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the PostgreSQL stores. These run only when `TEST_DATABASE_URL`
//! points at a disposable database; they are skipped otherwise.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use gantry_api::{
    Event, Job, Phase, PrincipalType, Project, Role, RoleAssignment, WorkerStatus,
};
use gantry_core::store::postgres::{
    PostgresEventsStore, PostgresProjectsStore, PostgresRoleAssignmentsStore,
};
use gantry_core::store::{EventsStore, ProjectsStore, RoleAssignmentsStore};

/// Helper macro to skip tests if database URL is not set.
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        }
    };
}

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

async fn get_test_pool() -> Option<PgPool> {
    let database_url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPool::connect(&database_url).await.ok()?;
    MIGRATOR.run(&pool).await.ok()?;
    Some(pool)
}

fn unique_id(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().to_string()[..8])
}

fn test_event(id: &str, project_id: &str) -> Event {
    Event {
        id: id.to_string(),
        project_id: Some(project_id.to_string()),
        source: "forge.sh/cli".to_string(),
        event_type: "exec".to_string(),
        created: Some(Utc::now()),
        ..Default::default()
    }
}

async fn cleanup_event(pool: &PgPool, id: &str) {
    sqlx::query("DELETE FROM events WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .ok();
}

#[tokio::test]
async fn test_project_create_is_unique() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("test database reachable");
    let store = PostgresProjectsStore::new(pool.clone());

    let id = unique_id("proj");
    let project = Project {
        id: id.clone(),
        created: Some(Utc::now()),
        ..Default::default()
    };
    store.create(&project).await.unwrap();
    let err = store.create(&project).await.unwrap_err();
    assert_eq!(err.error_code(), "CONFLICT");

    store.delete(&id).await.unwrap();
    let err = store.delete(&id).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_worker_phase_update_is_a_compare_and_set() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("test database reachable");
    let store = PostgresEventsStore::new(pool.clone());

    let id = unique_id("evt");
    store.create(&test_event(&id, "hello")).await.unwrap();

    let starting = WorkerStatus {
        phase: Phase::Starting,
        started: None,
        ended: None,
    };
    store
        .update_worker_status(&id, Phase::Pending, &starting)
        .await
        .unwrap();

    // The loser of the race observes a conflict and the document is
    // unchanged.
    let err = store
        .update_worker_status(&id, Phase::Pending, &starting)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CONFLICT");
    let event = store.get(&id).await.unwrap();
    assert_eq!(event.worker.status.phase, Phase::Starting);

    cleanup_event(&pool, &id).await;
}

#[tokio::test]
async fn test_job_names_are_unique_within_a_worker() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("test database reachable");
    let store = PostgresEventsStore::new(pool.clone());

    let id = unique_id("evt");
    store.create(&test_event(&id, "hello")).await.unwrap();
    for (expected, phase) in [
        (Phase::Pending, Phase::Starting),
        (Phase::Starting, Phase::Running),
    ] {
        store
            .update_worker_status(
                &id,
                expected,
                &WorkerStatus {
                    phase,
                    started: None,
                    ended: None,
                },
            )
            .await
            .unwrap();
    }

    let mut job = Job::default();
    job.spec.primary_container.image = "alpine".to_string();
    store.create_job(&id, "build", &job).await.unwrap();
    let err = store.create_job(&id, "build", &job).await.unwrap_err();
    assert_eq!(err.error_code(), "CONFLICT");

    let event = store.get(&id).await.unwrap();
    assert_eq!(event.worker.jobs.len(), 1);

    cleanup_event(&pool, &id).await;
}

#[tokio::test]
async fn test_worker_token_lookup() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("test database reachable");
    let store = PostgresEventsStore::new(pool.clone());

    let id = unique_id("evt");
    store.create(&test_event(&id, "hello")).await.unwrap();

    let hashed = format!("hash-{id}");
    store.set_worker_token(&id, &hashed).await.unwrap();
    let event = store.get_by_hashed_worker_token(&hashed).await.unwrap();
    assert_eq!(event.id, id);

    let err = store
        .get_by_hashed_worker_token("no-such-hash")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");

    cleanup_event(&pool, &id).await;
}

#[tokio::test]
async fn test_role_assignment_grant_and_revoke() {
    skip_if_no_db!();
    let pool = get_test_pool().await.expect("test database reachable");
    let store = PostgresRoleAssignmentsStore::new(pool);

    let principal_id = unique_id("sa");
    let assignment = RoleAssignment {
        principal_type: PrincipalType::ServiceAccount,
        principal_id: principal_id.clone(),
        role: Role::global("PROJECT_CREATOR"),
    };

    store.grant(&assignment).await.unwrap();
    store.grant(&assignment).await.unwrap();
    let listed = store
        .list_for_principal(PrincipalType::ServiceAccount, &principal_id)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    store.revoke(&assignment).await.unwrap();
    let err = store.revoke(&assignment).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}
