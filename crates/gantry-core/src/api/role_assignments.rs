// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Role assignment endpoints.

use axum::Json;
use axum::extract::{Extension, Query, State};
use serde::Deserialize;

use gantry_api::{PrincipalType, Role, RoleAssignment, roles};

use crate::authn::ResolvedPrincipal;
use crate::error::CoreError;

use super::{AppState, List};

/// `POST /v2/role-assignments`
pub async fn grant_role(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Json(assignment): Json<RoleAssignment>,
) -> Result<Json<serde_json::Value>, CoreError> {
    state
        .role_assignments
        .grant(&auth.principal, assignment)
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// Revocation targets arrive as query parameters.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeQuery {
    pub principal_type: String,
    pub principal_id: String,
    pub role: String,
    pub scope: Option<String>,
}

/// `DELETE /v2/role-assignments`
pub async fn revoke_role(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
    Query(query): Query<RevokeQuery>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let principal_type = PrincipalType::parse(&query.principal_type).ok_or_else(|| {
        CoreError::bad_request(format!(
            "{:?} is not a principal type",
            query.principal_type
        ))
    })?;
    let assignment = RoleAssignment {
        principal_type,
        principal_id: query.principal_id,
        role: Role::new(
            &query.role,
            query.scope.as_deref().unwrap_or(roles::SCOPE_GLOBAL),
        ),
    };
    state
        .role_assignments
        .revoke(&auth.principal, assignment)
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// `GET /v2/role-assignments`
pub async fn list_role_assignments(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
) -> Result<Json<List<RoleAssignment>>, CoreError> {
    let items = state.role_assignments.list(&auth.principal).await?;
    Ok(Json(List { items }))
}
