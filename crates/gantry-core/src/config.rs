// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

/// Gantry API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the REST listener binds to
    pub api_address: SocketAddr,
    /// TLS material; plain TCP when absent
    pub tls: Option<TlsConfig>,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Root password; root login is disabled when absent
    pub root_password: Option<String>,
    /// Shared secret identifying the scheduler daemon
    pub scheduler_token: String,
    /// Shared secret identifying the observer daemon
    pub observer_token: String,
    /// OIDC provider settings; user login is disabled when absent
    pub oidc: Option<OidcConfig>,
    /// How long sessions live
    pub session_ttl: Duration,
}

/// Paths to PEM-encoded TLS material.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

/// OpenID Connect provider settings.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Issuer URL; discovery is fetched from its well-known endpoint.
    pub provider_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Where the provider redirects after login (the session/auth endpoint).
    pub redirect_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`: PostgreSQL connection string
    /// - `SCHEDULER_TOKEN`, `OBSERVER_TOKEN`: shared secrets for the system
    ///   daemons
    ///
    /// Optional (with defaults):
    /// - `API_ADDRESS`: listen address (default: 0.0.0.0:8080)
    /// - `API_TLS_CERT` / `API_TLS_KEY`: serve TLS when both are set
    /// - `ROOT_USER_ENABLED` / `ROOT_USER_PASSWORD`: enable root login
    /// - `OIDC_ENABLED` / `OIDC_PROVIDER_URL` / `OIDC_CLIENT_ID` /
    ///   `OIDC_CLIENT_SECRET` / `OIDC_REDIRECT_URL`: enable user login
    /// - `SESSION_TTL_SECONDS`: session lifetime (default: 3600)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_address: SocketAddr = std::env::var("API_ADDRESS")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("API_ADDRESS", "must be a socket address"))?;

        let tls = match (std::env::var("API_TLS_CERT"), std::env::var("API_TLS_KEY")) {
            (Ok(cert_path), Ok(key_path)) => Some(TlsConfig {
                cert_path,
                key_path,
            }),
            (Err(_), Err(_)) => None,
            _ => {
                return Err(ConfigError::Invalid(
                    "API_TLS_CERT",
                    "API_TLS_CERT and API_TLS_KEY must be set together",
                ));
            }
        };

        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let root_password = if bool_var("ROOT_USER_ENABLED")? {
            Some(
                std::env::var("ROOT_USER_PASSWORD")
                    .ok()
                    .filter(|p| !p.is_empty())
                    .ok_or(ConfigError::Missing("ROOT_USER_PASSWORD"))?,
            )
        } else {
            None
        };

        let scheduler_token =
            std::env::var("SCHEDULER_TOKEN").map_err(|_| ConfigError::Missing("SCHEDULER_TOKEN"))?;
        let observer_token =
            std::env::var("OBSERVER_TOKEN").map_err(|_| ConfigError::Missing("OBSERVER_TOKEN"))?;

        let oidc = if bool_var("OIDC_ENABLED")? {
            Some(OidcConfig {
                provider_url: std::env::var("OIDC_PROVIDER_URL")
                    .map_err(|_| ConfigError::Missing("OIDC_PROVIDER_URL"))?,
                client_id: std::env::var("OIDC_CLIENT_ID")
                    .map_err(|_| ConfigError::Missing("OIDC_CLIENT_ID"))?,
                client_secret: std::env::var("OIDC_CLIENT_SECRET")
                    .map_err(|_| ConfigError::Missing("OIDC_CLIENT_SECRET"))?,
                redirect_url: std::env::var("OIDC_REDIRECT_URL")
                    .map_err(|_| ConfigError::Missing("OIDC_REDIRECT_URL"))?,
            })
        } else {
            None
        };

        let session_ttl_seconds: u64 = std::env::var("SESSION_TTL_SECONDS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("SESSION_TTL_SECONDS", "must be a positive integer"))?;

        Ok(Self {
            api_address,
            tls,
            database_url,
            root_password,
            scheduler_token,
            observer_token,
            oidc,
            session_ttl: Duration::from_secs(session_ttl_seconds),
        })
    }
}

fn bool_var(name: &'static str) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(false),
        Ok(v) => match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(ConfigError::Invalid(name, "must be a boolean")),
        },
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
