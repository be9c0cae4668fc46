// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Project endpoints.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;

use gantry_api::{ListOptions, Project};

use crate::authn::ResolvedPrincipal;
use crate::error::CoreError;

use super::{AppState, List};

/// `POST /v2/projects`
pub async fn create_project(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Json(project): Json<Project>,
) -> Result<(StatusCode, Json<Project>), CoreError> {
    let project = state.projects.create(&auth.principal, project).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /v2/projects`
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Query(opts): Query<ListOptions>,
) -> Result<Json<List<Project>>, CoreError> {
    let items = state.projects.list(&auth.principal, &opts).await?;
    Ok(Json(List { items }))
}

/// `GET /v2/projects/{id}`
pub async fn get_project(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<Project>, CoreError> {
    Ok(Json(state.projects.get(&auth.principal, &id).await?))
}

/// `PUT /v2/projects/{id}`
pub async fn update_project(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
    Json(mut project): Json<Project>,
) -> Result<Json<Project>, CoreError> {
    if !project.id.is_empty() && project.id != id {
        return Err(CoreError::bad_request(
            "the project id in the body does not match the path",
        ));
    }
    project.id = id;
    Ok(Json(state.projects.update(&auth.principal, project).await?))
}

/// `DELETE /v2/projects/{id}`
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state.projects.delete(&auth.principal, &id).await?;
    Ok(Json(serde_json::json!({})))
}
