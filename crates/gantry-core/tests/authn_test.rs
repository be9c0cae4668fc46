// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for sessions and token resolution.

mod common;

use common::{OBSERVER_TOKEN, ROOT_PASSWORD, SCHEDULER_TOKEN, harness};

use chrono::Utc;
use gantry_api::{Session, User};
use gantry_core::authn::{Principal, hash_token};
use gantry_core::store::SessionsStore;

#[tokio::test]
async fn test_root_login_and_token_resolution() {
    let h = harness();

    let token = h
        .sessions
        .create_root_session("root", ROOT_PASSWORD)
        .await
        .unwrap();
    assert!(token.expires.unwrap() > Utc::now());

    let resolved = h.resolver.resolve(&token.value).await.unwrap();
    assert_eq!(resolved.principal, Principal::Root);
    let session_id = resolved.session_id.expect("root sessions are session-based");

    // Logout kills the token.
    h.sessions.delete(&session_id).await.unwrap();
    let err = h.resolver.resolve(&token.value).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_AUTHENTICATED");
}

#[tokio::test]
async fn test_root_login_rejects_bad_credentials() {
    let h = harness();

    let err = h
        .sessions
        .create_root_session("root", "wrong")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_AUTHENTICATED");

    let err = h
        .sessions
        .create_root_session("admin", ROOT_PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_AUTHENTICATED");
}

#[tokio::test]
async fn test_session_stores_only_the_token_hash() {
    let h = harness();
    let token = h
        .sessions
        .create_root_session("root", ROOT_PASSWORD)
        .await
        .unwrap();

    let session = h
        .sessions_store
        .get_by_hashed_token(&hash_token(&token.value))
        .await
        .unwrap();
    assert_eq!(session.hashed_token, hash_token(&token.value));
    assert_ne!(session.hashed_token, token.value);
}

#[tokio::test]
async fn test_oidc_login_flow() {
    let h = harness();

    let token = h.sessions.create_user_session().await.unwrap();
    let auth_url = token.auth_url.expect("auth URL returned");
    let state = auth_url.split("state=").nth(1).unwrap().to_string();

    // Until the callback, the session is pending.
    let err = h.resolver.resolve(&token.value).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_AUTHENTICATED");

    h.sessions.authenticate(&state, "any-code").await.unwrap();

    let resolved = h.resolver.resolve(&token.value).await.unwrap();
    assert_eq!(
        resolved.principal,
        Principal::User {
            id: "jane@example.com".to_string()
        }
    );

    // The user record was created implicitly.
    let user = h.users.get(&Principal::Root, "jane@example.com").await.unwrap();
    assert!(user.created.is_some());
}

#[tokio::test]
async fn test_oidc_callback_with_unknown_state() {
    let h = harness();
    let err = h
        .sessions
        .authenticate("no-such-state", "code")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_expired_sessions_are_purged_on_lookup() {
    let h = harness();

    let raw_token = "expired-session-token";
    let session = Session {
        id: "sess-1".to_string(),
        root: true,
        user_id: None,
        authenticated: true,
        hashed_oidc_state: None,
        hashed_token: hash_token(raw_token),
        created: Utc::now() - chrono::TimeDelta::hours(2),
        expires: Utc::now() - chrono::TimeDelta::hours(1),
    };
    h.sessions_store.create(&session).await.unwrap();

    let err = h.resolver.resolve(raw_token).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_AUTHENTICATED");
    // Purged, not just rejected.
    assert!(
        h.sessions_store
            .get_by_hashed_token(&hash_token(raw_token))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_locked_user_cannot_authenticate() {
    let h = harness();

    let token = h.sessions.create_user_session().await.unwrap();
    let auth_url = token.auth_url.unwrap();
    let state = auth_url.split("state=").nth(1).unwrap().to_string();
    h.sessions.authenticate(&state, "code").await.unwrap();

    h.users
        .lock(&Principal::Root, "jane@example.com")
        .await
        .unwrap();

    // Locking revoked the session outright; even a fresh lookup fails.
    let err = h.resolver.resolve(&token.value).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_AUTHENTICATED");

    h.users
        .unlock(&Principal::Root, "jane@example.com")
        .await
        .unwrap();
    let user: User = h.users.get(&Principal::Root, "jane@example.com").await.unwrap();
    assert!(user.locked.is_none());
}

#[tokio::test]
async fn test_shared_secrets_resolve_to_daemon_principals() {
    let h = harness();

    let resolved = h.resolver.resolve(SCHEDULER_TOKEN).await.unwrap();
    assert_eq!(resolved.principal, Principal::Scheduler);
    assert!(resolved.session_id.is_none());

    let resolved = h.resolver.resolve(OBSERVER_TOKEN).await.unwrap();
    assert_eq!(resolved.principal, Principal::Observer);

    let err = h.resolver.resolve("not-a-secret").await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_AUTHENTICATED");
}

#[tokio::test]
async fn test_service_account_tokens_and_locking() {
    let h = harness();

    let token = h
        .service_accounts
        .create(
            &Principal::Root,
            gantry_api::ServiceAccount {
                id: "ci".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(token.expires.is_none(), "service account tokens do not expire");

    let resolved = h.resolver.resolve(&token.value).await.unwrap();
    assert_eq!(
        resolved.principal,
        Principal::ServiceAccount {
            id: "ci".to_string()
        }
    );

    h.service_accounts.lock(&Principal::Root, "ci").await.unwrap();
    let err = h.resolver.resolve(&token.value).await.unwrap_err();
    assert_eq!(err.error_code(), "NOT_AUTHENTICATED");

    // Unlock rotates the token; the old one stays dead.
    let new_token = h
        .service_accounts
        .unlock(&Principal::Root, "ci")
        .await
        .unwrap();
    assert!(h.resolver.resolve(&token.value).await.is_err());
    assert!(h.resolver.resolve(&new_token.value).await.is_ok());
}

#[tokio::test]
async fn test_duplicate_service_account_conflicts() {
    let h = harness();
    let account = gantry_api::ServiceAccount {
        id: "ci".to_string(),
        ..Default::default()
    };
    h.service_accounts
        .create(&Principal::Root, account.clone())
        .await
        .unwrap();
    let err = h
        .service_accounts
        .create(&Principal::Root, account)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "CONFLICT");
}
