// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The work queue feeding the scheduler daemon.
//!
//! Queue entries are rows in `scheduled_workers` / `scheduled_jobs`, keyed by
//! Event (and job name). The scheduler daemon polls and deletes them as it
//! launches pods; cancellation deletes the row before the scheduler gets to
//! it.

use async_trait::async_trait;
use sqlx::PgPool;

use gantry_api::Event;

use crate::error::CoreError;

/// Writer side of the scheduler work queue.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue_worker(&self, event: &Event) -> Result<(), CoreError>;

    async fn remove_worker(&self, event_id: &str) -> Result<(), CoreError>;

    async fn enqueue_job(&self, event: &Event, job_name: &str) -> Result<(), CoreError>;
}

/// PostgreSQL-backed implementation of [`WorkQueue`].
#[derive(Clone)]
pub struct PostgresWorkQueue {
    pool: PgPool,
}

impl PostgresWorkQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkQueue for PostgresWorkQueue {
    async fn enqueue_worker(&self, event: &Event) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_workers (event_id, project_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.id)
        .bind(event.project_id.as_deref().unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_worker(&self, event_id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM scheduled_workers WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn enqueue_job(&self, event: &Event, job_name: &str) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_jobs (event_id, job_name, project_id, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (event_id, job_name) DO NOTHING
            "#,
        )
        .bind(&event.id)
        .bind(job_name)
        .bind(event.project_id.as_deref().unwrap_or_default())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
