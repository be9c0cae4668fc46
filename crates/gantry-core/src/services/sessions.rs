// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The Sessions service: root login, the OIDC user login flow, and logout.
//!
//! Raw tokens exist exactly once, in the response that creates them; the
//! store only ever sees SHA-256 hashes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use gantry_api::{Session, Token, User};

use crate::authn::oidc::OidcProvider;
use crate::authn::{generate_token, hash_token, secrets_match};
use crate::error::{CoreError, Result};
use crate::store::{SessionsStore, UsersStore};

/// Username accepted for root login.
const ROOT_USERNAME: &str = "root";

/// Manages login sessions.
pub struct SessionsService {
    sessions: Arc<dyn SessionsStore>,
    users: Arc<dyn UsersStore>,
    oidc: Option<Arc<dyn OidcProvider>>,
    root_password: Option<String>,
    session_ttl: Duration,
}

impl SessionsService {
    pub fn new(
        sessions: Arc<dyn SessionsStore>,
        users: Arc<dyn UsersStore>,
        oidc: Option<Arc<dyn OidcProvider>>,
        root_password: Option<String>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            users,
            oidc,
            root_password,
            session_ttl,
        }
    }

    fn ttl(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::from_std(self.session_ttl)
            .unwrap_or_else(|_| chrono::TimeDelta::seconds(3600))
    }

    /// Root login with the static root password. The session is born
    /// authenticated.
    #[instrument(skip_all)]
    pub async fn create_root_session(&self, username: &str, password: &str) -> Result<Token> {
        let Some(root_password) = &self.root_password else {
            return Err(CoreError::not_supported(
                "root login is disabled; set ROOT_USER_ENABLED and ROOT_USER_PASSWORD",
            ));
        };
        // Both comparisons run unconditionally.
        let username_ok = secrets_match(username, ROOT_USERNAME);
        let password_ok = secrets_match(password, root_password);
        if !username_ok || !password_ok {
            return Err(CoreError::not_authenticated("bad root credentials"));
        }

        let token = generate_token();
        let now = Utc::now();
        let expires = now + self.ttl();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            root: true,
            user_id: None,
            authenticated: true,
            hashed_oidc_state: None,
            hashed_token: hash_token(&token),
            created: now,
            expires,
        };
        self.sessions.create(&session).await?;
        info!("Root session created");
        Ok(Token {
            value: token,
            expires: Some(expires),
            auth_url: None,
        })
    }

    /// Begin a user login: allocate a pending session and hand back the
    /// provider's authorization URL. The session only works after the OIDC
    /// callback promotes it.
    #[instrument(skip_all)]
    pub async fn create_user_session(&self) -> Result<Token> {
        let Some(oidc) = &self.oidc else {
            return Err(CoreError::not_supported(
                "user login is disabled; OIDC is not configured",
            ));
        };

        let token = generate_token();
        let oidc_state = generate_token();
        let now = Utc::now();
        let expires = now + self.ttl();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            root: false,
            user_id: None,
            authenticated: false,
            hashed_oidc_state: Some(hash_token(&oidc_state)),
            hashed_token: hash_token(&token),
            created: now,
            expires,
        };
        self.sessions.create(&session).await?;

        Ok(Token {
            value: token,
            expires: Some(expires),
            auth_url: Some(oidc.authorization_url(&oidc_state)),
        })
    }

    /// OIDC callback: match `state` to a pending session, exchange the
    /// code, upsert the User, and promote the session.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, state: &str, code: &str) -> Result<()> {
        let Some(oidc) = &self.oidc else {
            return Err(CoreError::not_supported(
                "user login is disabled; OIDC is not configured",
            ));
        };

        let session = self
            .sessions
            .get_by_hashed_oidc_state(&hash_token(state))
            .await?;
        if session.expired(Utc::now()) {
            let _ = self.sessions.delete(&session.id).await;
            return Err(CoreError::not_authenticated("login flow expired"));
        }

        let identity = oidc.authenticate(code).await?;
        let user = self
            .users
            .upsert(&User {
                id: identity.id.clone(),
                locked: None,
                created: Some(Utc::now()),
            })
            .await?;
        if user.locked.is_some() {
            return Err(CoreError::not_authenticated("user is locked"));
        }

        let expires = Utc::now() + self.ttl();
        self.sessions
            .authenticate(&session.id, &user.id, expires)
            .await?;
        info!(user_id = %user.id, "User session authenticated");
        Ok(())
    }

    /// Invalidate a session (logout).
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.delete(session_id).await
    }
}
