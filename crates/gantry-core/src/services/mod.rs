// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain services.
//!
//! Each service owns one slice of the domain, starts every operation with an
//! authorization check, and mediates between the stores and the substrate.
//! Services take the request principal explicitly; nothing here reads
//! process-wide state.

pub mod events;
pub mod logs;
pub mod projects;
pub mod role_assignments;
pub mod secrets;
pub mod service_accounts;
pub mod sessions;
pub mod users;

pub use events::EventsService;
pub use logs::LogsService;
pub use projects::ProjectsService;
pub use role_assignments::RoleAssignmentsService;
pub use secrets::SecretsService;
pub use service_accounts::ServiceAccountsService;
pub use sessions::SessionsService;
pub use users::UsersService;
