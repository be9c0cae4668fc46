// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identity types: Users, ServiceAccounts, Sessions, and bearer tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A human principal, created implicitly on first successful OIDC login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Email-shaped identifier supplied by the OIDC provider.
    pub id: String,
    /// When the user was locked; a locked user cannot authenticate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// A non-human principal with a long-lived bearer token.
///
/// The raw token is returned exactly once, at creation (or on unlock, which
/// rotates it); only its hash is ever stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    /// Human-chosen slug.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// A short-lived record tying a hashed bearer token to a principal.
///
/// A session is either the reserved root principal, an authenticated User, or
/// a pending User login flow awaiting the OIDC callback. This type never
/// crosses the wire; clients only ever see a [`Token`].
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub id: String,
    /// True for sessions created by root login.
    pub root: bool,
    /// The User this session belongs to, once authenticated.
    pub user_id: Option<String>,
    pub authenticated: bool,
    /// SHA-256 of the OIDC state string, present while the login flow is
    /// pending.
    pub hashed_oidc_state: Option<String>,
    /// SHA-256 of the bearer token.
    pub hashed_token: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl Session {
    /// Whether the session has expired as of `now`.
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }
}

/// A freshly issued bearer token, presented to the client exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// The opaque token value.
    pub value: String,
    /// When the token stops working. Absent for service account tokens,
    /// which do not expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    /// OIDC authorization URL the user must visit to complete login.
    /// Present only on user session creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let session = Session {
            expires: now + TimeDelta::seconds(60),
            ..Default::default()
        };
        assert!(!session.expired(now));
        assert!(session.expired(now + TimeDelta::seconds(60)));
        assert!(session.expired(now + TimeDelta::seconds(120)));
    }

    #[test]
    fn test_token_omits_absent_fields() {
        let token = Token {
            value: "opaque".to_string(),
            expires: None,
            auth_url: None,
        };
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json, serde_json::json!({"value": "opaque"}));
    }
}
