// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OpenID Connect login support.
//!
//! The server never validates ID tokens locally: it exchanges the
//! authorization code over TLS and asks the provider's userinfo endpoint who
//! the user is. Identity is the email claim, falling back to the subject.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::OidcConfig;
use crate::error::CoreError;

/// A user identity as reported by the provider.
#[derive(Debug, Clone)]
pub struct OidcIdentity {
    /// Email-shaped user ID.
    pub id: String,
}

/// The provider-side half of the login flow.
#[async_trait]
pub trait OidcProvider: Send + Sync {
    /// The URL the user must visit to authorize, carrying `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange the authorization code for the user's identity.
    async fn authenticate(&self, code: &str) -> Result<OidcIdentity, CoreError>;
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// [`OidcProvider`] backed by a real provider, configured through its
/// well-known discovery document.
pub struct HttpOidcProvider {
    http: reqwest::Client,
    config: OidcConfig,
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
}

impl HttpOidcProvider {
    /// Fetch the provider's discovery document and build a client.
    pub async fn discover(config: OidcConfig) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            config.provider_url.trim_end_matches('/')
        );
        let document: DiscoveryDocument = http
            .get(&discovery_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(Self {
            http,
            config,
            authorization_endpoint: document.authorization_endpoint,
            token_endpoint: document.token_endpoint,
            userinfo_endpoint: document.userinfo_endpoint,
        })
    }
}

#[async_trait]
impl OidcProvider for HttpOidcProvider {
    fn authorization_url(&self, state: &str) -> String {
        let mut url = match reqwest::Url::parse(&self.authorization_endpoint) {
            Ok(url) => url,
            // The endpoint came from the provider's own discovery document;
            // a parse failure here means the provider is broken anyway.
            Err(_) => return self.authorization_endpoint.clone(),
        };
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("scope", "openid email profile")
            .append_pair("state", state);
        url.to_string()
    }

    async fn authenticate(&self, code: &str) -> Result<OidcIdentity, CoreError> {
        let token: TokenResponse = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.config.redirect_url),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(|_| CoreError::not_authenticated("code exchange was rejected"))?
            .json()
            .await?;

        let info: UserInfo = self
            .http
            .get(&self.userinfo_endpoint)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(OidcIdentity {
            id: info.email.unwrap_or(info.sub),
        })
    }
}
