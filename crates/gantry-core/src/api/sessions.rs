// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Session endpoints: login (root and OIDC), the OIDC callback, logout.

use axum::Json;
use axum::extract::{Extension, Query, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

use gantry_api::Token;

use crate::authn::ResolvedPrincipal;
use crate::error::CoreError;

use super::AppState;

/// Root login uses HTTP Basic; its absence means an OIDC user session.
fn basic_credentials(headers: &HeaderMap) -> Result<Option<(String, String)>, CoreError> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let header = header
        .to_str()
        .map_err(|_| CoreError::not_authenticated("malformed Authorization header"))?;
    let Some(encoded) = header.strip_prefix("Basic ") else {
        return Ok(None);
    };
    let decoded = BASE64
        .decode(encoded.trim())
        .map_err(|_| CoreError::not_authenticated("malformed Basic credentials"))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| CoreError::not_authenticated("malformed Basic credentials"))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| CoreError::not_authenticated("malformed Basic credentials"))?;
    Ok(Some((username.to_string(), password.to_string())))
}

/// `POST /v2/sessions`
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Token>), CoreError> {
    let token = match basic_credentials(&headers)? {
        Some((username, password)) => {
            state
                .sessions
                .create_root_session(&username, &password)
                .await?
        }
        None => state.sessions.create_user_session().await?,
    };
    Ok((StatusCode::CREATED, Json(token)))
}

#[derive(Debug, Deserialize)]
pub struct OidcCallbackQuery {
    #[serde(rename = "state")]
    pub oidc_state: String,
    pub code: String,
}

/// `GET /v2/session/auth` -- the OIDC redirect target.
pub async fn oidc_callback(
    State(state): State<AppState>,
    Query(query): Query<OidcCallbackQuery>,
) -> Result<&'static str, CoreError> {
    state
        .sessions
        .authenticate(&query.oidc_state, &query.code)
        .await?;
    Ok("You are now logged in; you may close this window.")
}

/// `DELETE /v2/session` -- logout of the current session.
pub async fn delete_session(
    State(state): State<AppState>,
    Extension(auth): Extension<ResolvedPrincipal>,
) -> Result<Json<serde_json::Value>, CoreError> {
    let session_id = auth.session_id.ok_or_else(|| {
        CoreError::bad_request("the presented token is not session-based")
    })?;
    state.sessions.delete(&session_id).await?;
    Ok(Json(serde_json::json!({})))
}
