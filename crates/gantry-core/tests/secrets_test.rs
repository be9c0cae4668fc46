// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the Secrets service.

mod common;

use common::{harness, sample_project};

use gantry_api::{REDACTED, Secret};
use gantry_core::authn::Principal;

async fn with_project() -> common::Harness {
    let h = harness();
    h.projects
        .create(&Principal::Root, sample_project("hello", "forge.sh/cli", &["exec"]))
        .await
        .unwrap();
    h
}

#[tokio::test]
async fn test_set_list_unset_round_trip() {
    let h = with_project().await;

    h.secrets
        .set(
            &Principal::Root,
            "hello",
            Secret {
                key: "API_KEY".to_string(),
                value: "hunter2".to_string(),
            },
        )
        .await
        .unwrap();

    // List returns keys only; the value is redacted.
    let listed = h.secrets.list(&Principal::Root, "hello").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, "API_KEY");
    assert_eq!(listed[0].value, REDACTED);

    // The substrate holds the real value.
    let raw = h.secrets_store.raw("hello").await;
    assert_eq!(raw.get("API_KEY"), Some(&"hunter2".to_string()));

    h.secrets
        .unset(&Principal::Root, "hello", "API_KEY")
        .await
        .unwrap();
    assert!(h.secrets.list(&Principal::Root, "hello").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_secrets_require_project_admin() {
    let h = with_project().await;
    let outsider = Principal::User {
        id: "mallory@example.com".to_string(),
    };

    let err = h.secrets.list(&outsider, "hello").await.unwrap_err();
    assert_eq!(err.error_code(), "AUTHORIZATION");

    let err = h
        .secrets
        .set(
            &outsider,
            "hello",
            Secret {
                key: "API_KEY".to_string(),
                value: "x".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "AUTHORIZATION");
}

#[tokio::test]
async fn test_set_on_missing_project_is_not_found() {
    let h = harness();
    let err = h
        .secrets
        .set(
            &Principal::Root,
            "ghost",
            Secret {
                key: "API_KEY".to_string(),
                value: "x".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_empty_key_is_rejected() {
    let h = with_project().await;
    let err = h
        .secrets
        .set(
            &Principal::Root,
            "hello",
            Secret {
                key: String::new(),
                value: "x".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "BAD_REQUEST");
}
