// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service account administration endpoints.

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;

use gantry_api::{ServiceAccount, Token};

use crate::authn::ResolvedPrincipal;
use crate::error::CoreError;

use super::{AppState, List};

/// `POST /v2/service-accounts` -- the response carries the account's only
/// copy of its token.
pub async fn create_service_account(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Json(service_account): Json<ServiceAccount>,
) -> Result<(StatusCode, Json<Token>), CoreError> {
    let token = state
        .service_accounts
        .create(&auth.principal, service_account)
        .await?;
    Ok((StatusCode::CREATED, Json(token)))
}

/// `GET /v2/service-accounts`
pub async fn list_service_accounts(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
) -> Result<Json<List<ServiceAccount>>, CoreError> {
    let items = state.service_accounts.list(&auth.principal).await?;
    Ok(Json(List { items }))
}

/// `GET /v2/service-accounts/{id}`
pub async fn get_service_account(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<ServiceAccount>, CoreError> {
    Ok(Json(state.service_accounts.get(&auth.principal, &id).await?))
}

/// `PUT /v2/service-accounts/{id}/lock`
pub async fn lock_service_account(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state.service_accounts.lock(&auth.principal, &id).await?;
    Ok(Json(serde_json::json!({})))
}

/// `DELETE /v2/service-accounts/{id}/lock` -- unlock; returns the rotated
/// token.
pub async fn unlock_service_account(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Path(id): Path<String>,
) -> Result<Json<Token>, CoreError> {
    Ok(Json(state.service_accounts.unlock(&auth.principal, &id).await?))
}
