// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures: services wired against in-memory stores and the mock
//! substrate, with real role-based authorization.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use gantry_api::{
    ContainerSpec, Event, EventSubscription, Project, ProjectSpec, WorkerSpec,
};
use gantry_core::api::{self, AppState};
use gantry_core::authn::PrincipalResolver;
use gantry_core::authn::oidc::{OidcIdentity, OidcProvider};
use gantry_core::authz::RoleAuthorizer;
use gantry_core::error::CoreError;
use gantry_core::services::{
    EventsService, LogsService, ProjectsService, RoleAssignmentsService, SecretsService,
    ServiceAccountsService, SessionsService, UsersService,
};
use gantry_core::store::memory::{
    MemoryEventsStore, MemoryProjectsStore, MemoryRoleAssignmentsStore,
    MemoryServiceAccountsStore, MemorySessionsStore, MemoryUsersStore, StaticHealthIndicator,
};
use gantry_core::substrate::{MockSecretsStore, MockSubstrate};

pub const ROOT_PASSWORD: &str = "opensesame";
pub const SCHEDULER_TOKEN: &str = "scheduler-shared-secret";
pub const OBSERVER_TOKEN: &str = "observer-shared-secret";

/// OIDC provider that accepts any code and reports a fixed identity.
pub struct StaticOidcProvider {
    pub identity: String,
}

#[async_trait]
impl OidcProvider for StaticOidcProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://login.example.com/authorize?state={state}")
    }

    async fn authenticate(&self, _code: &str) -> Result<OidcIdentity, CoreError> {
        Ok(OidcIdentity {
            id: self.identity.clone(),
        })
    }
}

/// Everything a service-level test needs, with handles kept on the mocks.
pub struct Harness {
    pub projects_store: Arc<MemoryProjectsStore>,
    pub events_store: Arc<MemoryEventsStore>,
    pub users_store: Arc<MemoryUsersStore>,
    pub service_accounts_store: Arc<MemoryServiceAccountsStore>,
    pub sessions_store: Arc<MemorySessionsStore>,
    pub role_assignments_store: Arc<MemoryRoleAssignmentsStore>,
    pub substrate: Arc<MockSubstrate>,
    pub secrets_store: Arc<MockSecretsStore>,

    pub sessions: Arc<SessionsService>,
    pub users: Arc<UsersService>,
    pub service_accounts: Arc<ServiceAccountsService>,
    pub role_assignments: Arc<RoleAssignmentsService>,
    pub projects: Arc<ProjectsService>,
    pub events: Arc<EventsService>,
    pub secrets: Arc<SecretsService>,
    pub logs: Arc<LogsService>,
    pub resolver: Arc<PrincipalResolver>,
}

pub fn harness() -> Harness {
    harness_with_substrate(MockSubstrate::new())
}

pub fn harness_with_substrate(substrate: MockSubstrate) -> Harness {
    let projects_store = Arc::new(MemoryProjectsStore::new());
    let events_store = Arc::new(MemoryEventsStore::new());
    let users_store = Arc::new(MemoryUsersStore::new());
    let service_accounts_store = Arc::new(MemoryServiceAccountsStore::new());
    let sessions_store = Arc::new(MemorySessionsStore::new());
    let role_assignments_store = Arc::new(MemoryRoleAssignmentsStore::new());
    let substrate = Arc::new(substrate);
    let secrets_store = Arc::new(MockSecretsStore::new());

    let authorizer = Arc::new(RoleAuthorizer::new(role_assignments_store.clone()));

    let sessions = Arc::new(SessionsService::new(
        sessions_store.clone(),
        users_store.clone(),
        Some(Arc::new(StaticOidcProvider {
            identity: "jane@example.com".to_string(),
        })),
        Some(ROOT_PASSWORD.to_string()),
        Duration::from_secs(3600),
    ));
    let users = Arc::new(UsersService::new(
        authorizer.clone(),
        users_store.clone(),
        sessions_store.clone(),
        role_assignments_store.clone(),
    ));
    let service_accounts = Arc::new(ServiceAccountsService::new(
        authorizer.clone(),
        service_accounts_store.clone(),
    ));
    let role_assignments = Arc::new(RoleAssignmentsService::new(
        authorizer.clone(),
        role_assignments_store.clone(),
        users_store.clone(),
        service_accounts_store.clone(),
    ));
    let projects = Arc::new(ProjectsService::new(
        authorizer.clone(),
        projects_store.clone(),
        events_store.clone(),
        substrate.clone(),
    ));
    let events = Arc::new(EventsService::new(
        authorizer.clone(),
        projects_store.clone(),
        events_store.clone(),
        substrate.clone(),
    ));
    let secrets = Arc::new(SecretsService::new(
        authorizer.clone(),
        projects_store.clone(),
        secrets_store.clone(),
    ));
    let logs = Arc::new(LogsService::new(
        authorizer,
        projects_store.clone(),
        events_store.clone(),
        substrate.clone(),
    ));
    let resolver = Arc::new(PrincipalResolver::new(
        SCHEDULER_TOKEN.to_string(),
        OBSERVER_TOKEN.to_string(),
        sessions_store.clone(),
        users_store.clone(),
        service_accounts_store.clone(),
        events_store.clone(),
    ));

    Harness {
        projects_store,
        events_store,
        users_store,
        service_accounts_store,
        sessions_store,
        role_assignments_store,
        substrate,
        secrets_store,
        sessions,
        users,
        service_accounts,
        role_assignments,
        projects,
        events,
        secrets,
        logs,
        resolver,
    }
}

impl Harness {
    pub fn app_state(&self) -> AppState {
        AppState {
            sessions: self.sessions.clone(),
            users: self.users.clone(),
            service_accounts: self.service_accounts.clone(),
            role_assignments: self.role_assignments.clone(),
            projects: self.projects.clone(),
            events: self.events.clone(),
            secrets: self.secrets.clone(),
            logs: self.logs.clone(),
            resolver: self.resolver.clone(),
            health: Arc::new(StaticHealthIndicator),
        }
    }

    pub fn router(&self) -> axum::Router {
        api::router(self.app_state())
    }
}

/// A project subscribed to the given source/types, with an alpine worker
/// template.
pub fn sample_project(id: &str, source: &str, types: &[&str]) -> Project {
    Project {
        id: id.to_string(),
        description: None,
        spec: ProjectSpec {
            event_subscriptions: vec![EventSubscription {
                source: source.to_string(),
                types: types.iter().map(|t| t.to_string()).collect(),
                qualifiers: BTreeMap::new(),
                labels: BTreeMap::new(),
            }],
            worker_template: WorkerSpec {
                container: Some(ContainerSpec {
                    image: "alpine".to_string(),
                    command: vec!["echo".to_string(), "hi".to_string()],
                    ..Default::default()
                }),
                ..Default::default()
            },
        },
        kubernetes: None,
        created: None,
    }
}

/// An event creation request targeting one project.
pub fn sample_event(project_id: Option<&str>, source: &str, event_type: &str) -> Event {
    Event {
        project_id: project_id.map(|p| p.to_string()),
        source: source.to_string(),
        event_type: event_type.to_string(),
        ..Default::default()
    }
}
