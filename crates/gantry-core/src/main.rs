// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gantry API Server
//!
//! Wires up the dependency graph -- stores, substrate, services, the REST
//! router -- then serves until interrupted.
//!
//! Note: pod launching and status observation are driven by the scheduler
//! and observer daemons, which call back into this server as privileged
//! clients.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use gantry_core::api::{self, AppState};
use gantry_core::authn::PrincipalResolver;
use gantry_core::authn::oidc::{HttpOidcProvider, OidcProvider};
use gantry_core::authz::RoleAuthorizer;
use gantry_core::config::Config;
use gantry_core::services::{
    EventsService, LogsService, ProjectsService, RoleAssignmentsService, SecretsService,
    ServiceAccountsService, SessionsService, UsersService,
};
use gantry_core::store::postgres::{
    PostgresEventsStore, PostgresHealthIndicator, PostgresProjectsStore,
    PostgresRoleAssignmentsStore, PostgresServiceAccountsStore, PostgresSessionsStore,
    PostgresUsersStore,
};
use gantry_core::substrate::{
    KubernetesSecretsStore, KubernetesSubstrate, PostgresWorkQueue, Substrate,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gantry_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting Gantry API Server");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        api_address = %config.api_address,
        tls = config.tls.is_some(),
        root_enabled = config.root_password.is_some(),
        oidc_enabled = config.oidc.is_some(),
        "Configuration loaded"
    );

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    // Data stores
    let projects_store = Arc::new(PostgresProjectsStore::new(pool.clone()));
    let events_store = Arc::new(PostgresEventsStore::new(pool.clone()));
    let users_store = Arc::new(PostgresUsersStore::new(pool.clone()));
    let service_accounts_store = Arc::new(PostgresServiceAccountsStore::new(pool.clone()));
    let sessions_store = Arc::new(PostgresSessionsStore::new(pool.clone()));
    let role_assignments_store = Arc::new(PostgresRoleAssignmentsStore::new(pool.clone()));
    let health = Arc::new(PostgresHealthIndicator::new(pool.clone()));

    // Substrate
    let kube_client = kube::Client::try_default().await?;
    let queue = Arc::new(PostgresWorkQueue::new(pool.clone()));
    let substrate: Arc<dyn Substrate> =
        Arc::new(KubernetesSubstrate::new(kube_client.clone(), queue));
    let secrets_store = Arc::new(KubernetesSecretsStore::new(kube_client));

    // OIDC
    let oidc: Option<Arc<dyn OidcProvider>> = match &config.oidc {
        Some(oidc_config) => {
            info!(provider = %oidc_config.provider_url, "Discovering OIDC provider");
            Some(Arc::new(HttpOidcProvider::discover(oidc_config.clone()).await?))
        }
        None => None,
    };

    // Authorization
    let authorizer = Arc::new(RoleAuthorizer::new(role_assignments_store.clone()));

    // Domain services
    let sessions_service = Arc::new(SessionsService::new(
        sessions_store.clone(),
        users_store.clone(),
        oidc,
        config.root_password.clone(),
        config.session_ttl,
    ));
    let users_service = Arc::new(UsersService::new(
        authorizer.clone(),
        users_store.clone(),
        sessions_store.clone(),
        role_assignments_store.clone(),
    ));
    let service_accounts_service = Arc::new(ServiceAccountsService::new(
        authorizer.clone(),
        service_accounts_store.clone(),
    ));
    let role_assignments_service = Arc::new(RoleAssignmentsService::new(
        authorizer.clone(),
        role_assignments_store.clone(),
        users_store.clone(),
        service_accounts_store.clone(),
    ));
    let projects_service = Arc::new(ProjectsService::new(
        authorizer.clone(),
        projects_store.clone(),
        events_store.clone(),
        substrate.clone(),
    ));
    let events_service = Arc::new(EventsService::new(
        authorizer.clone(),
        projects_store.clone(),
        events_store.clone(),
        substrate.clone(),
    ));
    let secrets_service = Arc::new(SecretsService::new(
        authorizer.clone(),
        projects_store.clone(),
        secrets_store,
    ));
    let logs_service = Arc::new(LogsService::new(
        authorizer,
        projects_store,
        events_store.clone(),
        substrate,
    ));

    // Token filter
    let resolver = Arc::new(PrincipalResolver::new(
        config.scheduler_token.clone(),
        config.observer_token.clone(),
        sessions_store,
        users_store,
        service_accounts_store,
        events_store,
    ));

    let state = AppState {
        sessions: sessions_service,
        users: users_service,
        service_accounts: service_accounts_service,
        role_assignments: role_assignments_service,
        projects: projects_service,
        events: events_service,
        secrets: secrets_service,
        logs: logs_service,
        resolver,
        health,
    };

    info!("Gantry API Server initialized successfully");

    let api_address = config.api_address;
    let tls = config.tls.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_address, tls, state).await {
            error!("API server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    server_handle.abort();
    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
