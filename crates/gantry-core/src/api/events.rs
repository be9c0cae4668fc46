// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event endpoints, including the worker/job status surface the scheduler
//! and observer daemons drive.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use gantry_api::{
    Event, EventList, EventsSelector, Job, JobStatus, ListOptions, Phase, SourceState,
    WorkerStatus,
};

use crate::authn::ResolvedPrincipal;
use crate::error::CoreError;
use crate::substrate::LogsSelector;

use super::AppState;

/// `POST /v2/events` -- returns every Event the fan-out materialized.
pub async fn create_event(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Json(event): Json<Event>,
) -> Result<(StatusCode, Json<EventList>), CoreError> {
    let items = state.events.create(&auth.principal, event).await?;
    Ok((
        StatusCode::CREATED,
        Json(EventList {
            items,
            continue_token: None,
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsListQuery {
    /// Restrict to one project.
    pub project_id: Option<String>,
    /// Comma-separated worker phases.
    pub worker_phases: Option<String>,
    #[serde(rename = "continue")]
    pub continue_token: Option<String>,
    pub limit: Option<i64>,
}

impl EventsListQuery {
    fn into_parts(self) -> Result<(EventsSelector, ListOptions), CoreError> {
        let mut worker_phases = Vec::new();
        if let Some(raw) = &self.worker_phases {
            for token in raw.split(',').filter(|t| !t.is_empty()) {
                let phase = Phase::parse(token).ok_or_else(|| {
                    CoreError::bad_request(format!("{token:?} is not a worker phase"))
                })?;
                worker_phases.push(phase);
            }
        }
        Ok((
            EventsSelector {
                project_id: self.project_id,
                worker_phases,
            },
            ListOptions {
                continue_token: self.continue_token,
                limit: self.limit,
            },
        ))
    }
}

/// `GET /v2/events`
pub async fn list_events(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Query(query): Query<EventsListQuery>,
) -> Result<Json<EventList>, CoreError> {
    let (selector, opts) = query.into_parts()?;
    Ok(Json(
        state.events.list(&auth.principal, &selector, &opts).await?,
    ))
}

/// `GET /v2/events/{id}`
pub async fn get_event(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<Event>, CoreError> {
    Ok(Json(state.events.get(&auth.principal, &id).await?))
}

/// `DELETE /v2/events/{id}`
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state.events.delete(&auth.principal, &id).await?;
    Ok(Json(serde_json::json!({})))
}

/// `PUT /v2/events/{id}/cancel`
pub async fn cancel_event(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state.events.cancel(&auth.principal, &id).await?;
    Ok(Json(serde_json::json!({})))
}

/// `PUT /v2/events/{id}/source-state`
pub async fn update_source_state(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
    Json(source_state): Json<SourceState>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state
        .events
        .update_source_state(&auth.principal, &id, source_state)
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// `PUT /v2/events/{id}/worker/status`
pub async fn update_worker_status(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
    Json(status): Json<WorkerStatus>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state
        .events
        .update_worker_status(&auth.principal, &id, status)
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// `POST /v2/events/{id}/worker/jobs/{name}`
pub async fn create_job(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path((id, name)): Path<(String, String)>,
    Json(job): Json<Job>,
) -> Result<(StatusCode, Json<serde_json::Value>), CoreError> {
    state
        .events
        .create_job(&auth.principal, &id, &name, job)
        .await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({}))))
}

/// `PUT /v2/events/{id}/worker/jobs/{name}/status`
pub async fn update_job_status(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path((id, name)): Path<(String, String)>,
    Json(status): Json<JobStatus>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state
        .events
        .update_job_status(&auth.principal, &id, &name, status)
        .await?;
    Ok(Json(serde_json::json!({})))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub job: Option<String>,
    pub container: Option<String>,
}

/// `GET /v2/events/{id}/logs`
pub async fn get_logs(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<String, CoreError> {
    let selector = LogsSelector {
        job: query.job,
        container: query.container,
    };
    state.logs.get(&auth.principal, &id, &selector).await
}
