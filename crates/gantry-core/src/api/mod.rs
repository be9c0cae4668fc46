// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! REST surface of the control plane.
//!
//! A thin shell: handlers extract the principal the token filter attached,
//! decode JSON, call the matching service, and map [`CoreError`] onto the
//! wire. All decisions live in the services.

pub mod auth;
pub mod error;
pub mod events;
pub mod projects;
pub mod role_assignments;
pub mod secrets;
pub mod service_accounts;
pub mod sessions;
pub mod users;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::routing::{delete, get, post, put};
use axum_server::tls_rustls::RustlsConfig;
use serde::Serialize;
use tracing::info;

use crate::authn::PrincipalResolver;
use crate::config::TlsConfig;
use crate::services::{
    EventsService, LogsService, ProjectsService, RoleAssignmentsService, SecretsService,
    ServiceAccountsService, SessionsService, UsersService,
};
use crate::store::HealthIndicator;

/// Everything the handlers need, threaded through axum state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionsService>,
    pub users: Arc<UsersService>,
    pub service_accounts: Arc<ServiceAccountsService>,
    pub role_assignments: Arc<RoleAssignmentsService>,
    pub projects: Arc<ProjectsService>,
    pub events: Arc<EventsService>,
    pub secrets: Arc<SecretsService>,
    pub logs: Arc<LogsService>,
    pub resolver: Arc<PrincipalResolver>,
    pub health: Arc<dyn HealthIndicator>,
}

/// Plain item list; collections without pagination use this shape.
#[derive(Debug, Serialize)]
pub struct List<T: Serialize> {
    pub items: Vec<T>,
}

/// Assemble the full route table.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/healthz", get(healthz))
        .route("/v2/sessions", post(sessions::create_session))
        .route("/v2/session/auth", get(sessions::oidc_callback));

    let protected = Router::new()
        .route("/v2/session", delete(sessions::delete_session))
        .route("/v2/users", get(users::list_users))
        .route(
            "/v2/users/:id",
            get(users::get_user).delete(users::delete_user),
        )
        .route(
            "/v2/users/:id/lock",
            put(users::lock_user).delete(users::unlock_user),
        )
        .route(
            "/v2/service-accounts",
            get(service_accounts::list_service_accounts)
                .post(service_accounts::create_service_account),
        )
        .route(
            "/v2/service-accounts/:id",
            get(service_accounts::get_service_account),
        )
        .route(
            "/v2/service-accounts/:id/lock",
            put(service_accounts::lock_service_account)
                .delete(service_accounts::unlock_service_account),
        )
        .route(
            "/v2/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/v2/projects/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/v2/projects/:id/secrets",
            get(secrets::list_secrets).post(secrets::set_secret),
        )
        .route("/v2/projects/:id/secrets/:key", delete(secrets::unset_secret))
        .route(
            "/v2/events",
            get(events::list_events).post(events::create_event),
        )
        .route(
            "/v2/events/:id",
            get(events::get_event).delete(events::delete_event),
        )
        .route("/v2/events/:id/cancel", put(events::cancel_event))
        .route(
            "/v2/events/:id/source-state",
            put(events::update_source_state),
        )
        .route(
            "/v2/events/:id/worker/status",
            put(events::update_worker_status),
        )
        .route(
            "/v2/events/:id/worker/jobs/:name",
            post(events::create_job),
        )
        .route(
            "/v2/events/:id/worker/jobs/:name/status",
            put(events::update_job_status),
        )
        .route("/v2/events/:id/logs", get(events::get_logs))
        .route(
            "/v2/role-assignments",
            get(role_assignments::list_role_assignments)
                .post(role_assignments::grant_role)
                .delete(role_assignments::revoke_role),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ));

    public.merge(protected).with_state(state)
}

#[derive(Debug, Serialize)]
struct Health {
    healthy: bool,
    version: &'static str,
}

async fn healthz(State(state): State<AppState>) -> axum::Json<Health> {
    axum::Json(Health {
        healthy: state.health.healthy().await,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Serve the router, with TLS when configured.
pub async fn serve(
    addr: SocketAddr,
    tls: Option<TlsConfig>,
    state: AppState,
) -> anyhow::Result<()> {
    let app = router(state);
    match tls {
        Some(tls) => {
            info!(%addr, "Serving with TLS");
            let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;
            axum_server::bind_rustls(addr, rustls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            info!(%addr, "Serving without TLS");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}
