// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! User administration endpoints.

use axum::Json;
use axum::extract::{Extension, Path, State};

use gantry_api::User;

use crate::authn::ResolvedPrincipal;
use crate::error::CoreError;

use super::{AppState, List};

/// `GET /v2/users`
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
) -> Result<Json<List<User>>, CoreError> {
    let items = state.users.list(&auth.principal).await?;
    Ok(Json(List { items }))
}

/// `GET /v2/users/{id}`
pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<User>, CoreError> {
    Ok(Json(state.users.get(&auth.principal, &id).await?))
}

/// `DELETE /v2/users/{id}`
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state.users.delete(&auth.principal, &id).await?;
    Ok(Json(serde_json::json!({})))
}

/// `PUT /v2/users/{id}/lock`
pub async fn lock_user(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state.users.lock(&auth.principal, &id).await?;
    Ok(Json(serde_json::json!({})))
}

/// `DELETE /v2/users/{id}/lock`
pub async fn unlock_user(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state.users.unlock(&auth.principal, &id).await?;
    Ok(Json(serde_json::json!({})))
}
