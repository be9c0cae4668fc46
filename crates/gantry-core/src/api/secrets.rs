// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Project secret endpoints.

use axum::Json;
use axum::extract::{Extension, Path, State};

use gantry_api::Secret;

use crate::authn::ResolvedPrincipal;
use crate::error::CoreError;

use super::{AppState, List};

/// `GET /v2/projects/{id}/secrets` -- keys only, values redacted.
pub async fn list_secrets(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(project_id): Path<String>,
) -> Result<Json<List<Secret>>, CoreError> {
    let items = state.secrets.list(&auth.principal, &project_id).await?;
    Ok(Json(List { items }))
}

/// `POST /v2/projects/{id}/secrets`
pub async fn set_secret(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(project_id): Path<String>,
    Json(secret): Json<Secret>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state
        .secrets
        .set(&auth.principal, &project_id, secret)
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// `DELETE /v2/projects/{id}/secrets/{key}`
pub async fn unset_secret(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path((project_id, key)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state
        .secrets
        .unset(&auth.principal, &project_id, &key)
        .await?;
    Ok(Json(serde_json::json!({})))
}
