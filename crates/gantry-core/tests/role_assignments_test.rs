// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the RoleAssignments service.

mod common;

use common::harness;

use gantry_api::{PrincipalType, Role, RoleAssignment, roles};
use gantry_core::authn::Principal;
use gantry_core::store::UsersStore;

fn ci_assignment(role: &str, scope: &str) -> RoleAssignment {
    RoleAssignment {
        principal_type: PrincipalType::ServiceAccount,
        principal_id: "ci".to_string(),
        role: Role::new(role, scope),
    }
}

async fn with_ci_account() -> common::Harness {
    let h = harness();
    h.service_accounts
        .create(
            &Principal::Root,
            gantry_api::ServiceAccount {
                id: "ci".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h
}

#[tokio::test]
async fn test_grant_is_idempotent() {
    let h = with_ci_account().await;
    let assignment = ci_assignment(roles::names::PROJECT_CREATOR, roles::SCOPE_GLOBAL);

    h.role_assignments
        .grant(&Principal::Root, assignment.clone())
        .await
        .unwrap();
    h.role_assignments
        .grant(&Principal::Root, assignment)
        .await
        .unwrap();

    let listed = h.role_assignments.list(&Principal::Root).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_revoke_of_missing_assignment_is_not_found() {
    let h = with_ci_account().await;
    let err = h
        .role_assignments
        .revoke(
            &Principal::Root,
            ci_assignment(roles::names::PROJECT_CREATOR, roles::SCOPE_GLOBAL),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_grant_requires_an_existing_principal() {
    let h = harness();
    let err = h
        .role_assignments
        .grant(
            &Principal::Root,
            ci_assignment(roles::names::PROJECT_CREATOR, roles::SCOPE_GLOBAL),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_granted_role_takes_effect_and_revocation_removes_it() {
    let h = with_ci_account().await;
    let ci = Principal::ServiceAccount {
        id: "ci".to_string(),
    };
    let project = common::sample_project("hello", "forge.sh/cli", &["exec"]);

    // Without the role: denied.
    let err = h.projects.create(&ci, project.clone()).await.unwrap_err();
    assert_eq!(err.error_code(), "AUTHORIZATION");

    // Grant, retry: allowed.
    let assignment = ci_assignment(roles::names::PROJECT_CREATOR, roles::SCOPE_GLOBAL);
    h.role_assignments
        .grant(&Principal::Root, assignment.clone())
        .await
        .unwrap();
    h.projects.create(&ci, project).await.unwrap();

    // Revoke: denied again.
    h.role_assignments
        .revoke(&Principal::Root, assignment)
        .await
        .unwrap();
    let err = h
        .projects
        .create(&ci, common::sample_project("world", "forge.sh/cli", &["exec"]))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "AUTHORIZATION");
}

#[tokio::test]
async fn test_only_admins_manage_role_assignments() {
    let h = with_ci_account().await;
    let ci = Principal::ServiceAccount {
        id: "ci".to_string(),
    };

    let err = h
        .role_assignments
        .grant(&ci, ci_assignment(roles::names::ADMIN, roles::SCOPE_GLOBAL))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "AUTHORIZATION");

    let err = h.role_assignments.list(&ci).await.unwrap_err();
    assert_eq!(err.error_code(), "AUTHORIZATION");
}

#[tokio::test]
async fn test_deleting_a_user_revokes_their_assignments() {
    let h = harness();
    h.users_store
        .upsert(&gantry_api::User {
            id: "jane@example.com".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    h.role_assignments
        .grant(
            &Principal::Root,
            RoleAssignment {
                principal_type: PrincipalType::User,
                principal_id: "jane@example.com".to_string(),
                role: Role::global(roles::names::PROJECT_CREATOR),
            },
        )
        .await
        .unwrap();

    h.users
        .delete(&Principal::Root, "jane@example.com")
        .await
        .unwrap();

    assert!(
        h.role_assignments
            .list(&Principal::Root)
            .await
            .unwrap()
            .is_empty()
    );
}
