// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The token filter: resolves the bearer token on every protected route and
//! attaches the principal to the request.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::authn::ResolvedPrincipal;
use crate::error::CoreError;

use super::AppState;

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, CoreError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| CoreError::not_authenticated("no Authorization header"))?
        .to_str()
        .map_err(|_| CoreError::not_authenticated("malformed Authorization header"))?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CoreError::not_authenticated("expected a bearer token"))
}

/// Middleware on every protected route. Anonymous access is rejected here;
/// only the login endpoints and the health probe bypass it.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, CoreError> {
    let token = bearer_token(request.headers())?.to_string();
    let resolved: ResolvedPrincipal = state.resolver.resolve(&token).await?;
    request.extensions_mut().insert(resolved);
    Ok(next.run(request).await)
}
