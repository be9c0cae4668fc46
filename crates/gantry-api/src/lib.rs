// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared domain model for the gantry control plane.
//!
//! This crate holds the types that cross the wire between the API server and
//! its clients (CLI, gateways, scheduler, observer, workers): Events and their
//! embedded Workers and Jobs, Projects and their subscriptions, identity and
//! role types, and the worker/job phase machine. It is pure data and logic --
//! no I/O lives here.

pub mod event;
pub mod identity;
pub mod meta;
pub mod phases;
pub mod project;
pub mod roles;
pub mod validation;

pub use event::{
    ContainerSpec, Event, EventList, EventsSelector, Job, JobContainerSpec, JobSpec, JobStatus,
    SourceState, Worker, WorkerSpec, WorkerStatus,
};
pub use identity::{ServiceAccount, Session, Token, User};
pub use meta::ListOptions;
pub use phases::{Driver, Phase};
pub use project::{EventSubscription, KubernetesConfig, Project, ProjectSpec, REDACTED, Secret};
pub use roles::{PrincipalType, Role, RoleAssignment};
pub use validation::ValidationError;
