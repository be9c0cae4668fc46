// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authentication: principals, bearer tokens, and token resolution.
//!
//! Principals are a closed set of variants. Reserved principals (root,
//! scheduler, observer, workers) carry compile-time role sets; Users and
//! ServiceAccounts are looked up in the role-assignments store by the
//! authorizer instead.
//!
//! Bearer tokens are 256 bits from the OS random source, presented to
//! clients as hex, and stored only as SHA-256 hashes. The scheduler and
//! observer daemons authenticate through a separate shared-secret scheme
//! that never touches the session store.

pub mod oidc;

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use gantry_api::{Role, roles};

use crate::error::CoreError;
use crate::store::{EventsStore, ServiceAccountsStore, SessionsStore, UsersStore};

/// The authenticated identity attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// The reserved root user (static password login).
    Root,
    /// The scheduler daemon (shared secret).
    Scheduler,
    /// The observer daemon (shared secret).
    Observer,
    /// An Event's worker (per-event token).
    Worker {
        /// The Event this worker belongs to.
        event_id: String,
    },
    /// A human user (session token).
    User { id: String },
    /// A service account (long-lived token).
    ServiceAccount { id: String },
}

impl Principal {
    /// Compile-time role set for reserved principals; `None` for Users and
    /// ServiceAccounts, whose roles live in the role-assignments store.
    pub fn reserved_roles(&self) -> Option<Vec<Role>> {
        match self {
            Principal::Root => Some(vec![
                Role::global(roles::names::ADMIN),
                Role::global(roles::names::READER),
                Role::global(roles::names::EVENT_CREATOR),
                Role::global(roles::names::PROJECT_CREATOR),
                Role::global(roles::names::PROJECT_ADMIN),
                Role::global(roles::names::PROJECT_DEVELOPER),
                Role::global(roles::names::PROJECT_USER),
            ]),
            Principal::Scheduler => Some(vec![
                Role::global(roles::names::READER),
                Role::global(roles::names::SCHEDULER),
            ]),
            Principal::Observer => Some(vec![
                Role::global(roles::names::READER),
                Role::global(roles::names::OBSERVER),
            ]),
            Principal::Worker { event_id } => Some(vec![
                Role::global(roles::names::READER),
                Role::new(roles::names::WORKER, event_id),
            ]),
            Principal::User { .. } | Principal::ServiceAccount { .. } => None,
        }
    }

    /// Short description for log fields.
    pub fn describe(&self) -> String {
        match self {
            Principal::Root => "root".to_string(),
            Principal::Scheduler => "scheduler".to_string(),
            Principal::Observer => "observer".to_string(),
            Principal::Worker { event_id } => format!("worker({event_id})"),
            Principal::User { id } => format!("user({id})"),
            Principal::ServiceAccount { id } => format!("service-account({id})"),
        }
    }
}

/// Generate a new 256-bit bearer token, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 of a token, hex-encoded. The only form the stores ever see.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Constant-time string comparison for shared secrets.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    !expected.is_empty() && presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Resolves a presented bearer token to a [`Principal`].
///
/// Resolution order: shared secrets (scheduler, observer), per-event worker
/// tokens, sessions (root or user), then service account tokens. Expired
/// sessions are purged on sight.
pub struct PrincipalResolver {
    scheduler_token: String,
    observer_token: String,
    sessions: Arc<dyn SessionsStore>,
    users: Arc<dyn UsersStore>,
    service_accounts: Arc<dyn ServiceAccountsStore>,
    events: Arc<dyn EventsStore>,
}

/// The outcome of resolving a token: the principal, plus the backing session
/// ID when the token was session-based (so the session can be deleted on
/// logout).
#[derive(Debug, Clone)]
pub struct ResolvedPrincipal {
    pub principal: Principal,
    pub session_id: Option<String>,
}

impl PrincipalResolver {
    pub fn new(
        scheduler_token: String,
        observer_token: String,
        sessions: Arc<dyn SessionsStore>,
        users: Arc<dyn UsersStore>,
        service_accounts: Arc<dyn ServiceAccountsStore>,
        events: Arc<dyn EventsStore>,
    ) -> Self {
        Self {
            scheduler_token,
            observer_token,
            sessions,
            users,
            service_accounts,
            events,
        }
    }

    /// Resolve a raw bearer token. Fails with `NotAuthenticated` when the
    /// token matches nothing, or matches a locked or expired identity.
    pub async fn resolve(&self, token: &str) -> Result<ResolvedPrincipal, CoreError> {
        if token.is_empty() {
            return Err(CoreError::not_authenticated("no token presented"));
        }

        if secrets_match(token, &self.scheduler_token) {
            return Ok(ResolvedPrincipal {
                principal: Principal::Scheduler,
                session_id: None,
            });
        }
        if secrets_match(token, &self.observer_token) {
            return Ok(ResolvedPrincipal {
                principal: Principal::Observer,
                session_id: None,
            });
        }

        let hashed = hash_token(token);

        match self.events.get_by_hashed_worker_token(&hashed).await {
            Ok(event) => {
                return Ok(ResolvedPrincipal {
                    principal: Principal::Worker { event_id: event.id },
                    session_id: None,
                });
            }
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        match self.sessions.get_by_hashed_token(&hashed).await {
            Ok(session) => {
                if session.expired(chrono::Utc::now()) {
                    // Purge on sight; no background sweeper.
                    let _ = self.sessions.delete(&session.id).await;
                    return Err(CoreError::not_authenticated("session expired"));
                }
                if !session.authenticated {
                    return Err(CoreError::not_authenticated("session is not authenticated"));
                }
                if session.root {
                    return Ok(ResolvedPrincipal {
                        principal: Principal::Root,
                        session_id: Some(session.id),
                    });
                }
                let user_id = session.user_id.clone().ok_or_else(|| {
                    CoreError::internal("authenticated session carries no principal")
                })?;
                let user = self.users.get(&user_id).await?;
                if user.locked.is_some() {
                    return Err(CoreError::not_authenticated("user is locked"));
                }
                return Ok(ResolvedPrincipal {
                    principal: Principal::User { id: user_id },
                    session_id: Some(session.id),
                });
            }
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        match self.service_accounts.get_by_hashed_token(&hashed).await {
            Ok(service_account) => {
                if service_account.locked.is_some() {
                    return Err(CoreError::not_authenticated("service account is locked"));
                }
                Ok(ResolvedPrincipal {
                    principal: Principal::ServiceAccount {
                        id: service_account.id,
                    },
                    session_id: None,
                })
            }
            Err(CoreError::NotFound { .. }) => {
                Err(CoreError::not_authenticated("token not recognized"))
            }
            Err(e) => Err(e),
        }
    }
}
