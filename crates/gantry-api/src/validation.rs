// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Field validation shared by the API server and clients.
//!
//! Hand-rolled character checks instead of a regex engine: the grammars are
//! tiny and these run on every request.

use thiserror::Error;

/// A field failed validation.
#[derive(Debug, Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    /// The offending field.
    pub field: &'static str,
    /// What was wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Maximum length of a Job name (DNS label limit).
pub const MAX_JOB_NAME_LEN: usize = 63;

/// Maximum length of a Project ID. Leaves headroom for the namespace prefix
/// under the 63-character DNS label limit.
pub const MAX_PROJECT_ID_LEN: usize = 45;

/// Validate an Event source: lowercase alphanumerics plus `.`, `/` and `-`,
/// starting with a letter. Sources are domain-shaped, e.g. `forge.sh/cli`.
pub fn validate_source(source: &str) -> Result<(), ValidationError> {
    let mut chars = source.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_lowercase() => chars
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '/' | '-')),
        _ => false,
    };
    if !valid {
        return Err(ValidationError::new(
            "source",
            format!("{source:?} is not a valid event source"),
        ));
    }
    Ok(())
}

/// Validate an Event type: non-empty, no whitespace.
pub fn validate_event_type(event_type: &str) -> Result<(), ValidationError> {
    if event_type.is_empty() || event_type.chars().any(|c| c.is_whitespace()) {
        return Err(ValidationError::new(
            "type",
            format!("{event_type:?} is not a valid event type"),
        ));
    }
    Ok(())
}

/// Validate label/qualifier keys: alphanumerics plus `.`, `_` and `-`,
/// starting with a letter.
pub fn validate_kv_keys(
    field: &'static str,
    pairs: &std::collections::BTreeMap<String, String>,
) -> Result<(), ValidationError> {
    for key in pairs.keys() {
        let mut chars = key.chars();
        let valid = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => {
                chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            }
            _ => false,
        };
        if !valid {
            return Err(ValidationError::new(
                field,
                format!("{key:?} is not a valid key"),
            ));
        }
    }
    Ok(())
}

/// Validate a Job name: `[a-z0-9-]`, 1..=63 characters.
pub fn validate_job_name(name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_JOB_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(ValidationError::new(
            "name",
            format!("{name:?} is not a valid job name"),
        ));
    }
    Ok(())
}

/// Validate a Project ID: a DNS-safe slug (lowercase alphanumerics and `-`,
/// starting with a letter, ending alphanumeric), at most
/// [`MAX_PROJECT_ID_LEN`] characters.
pub fn validate_project_id(id: &str) -> Result<(), ValidationError> {
    let bytes = id.as_bytes();
    let valid = !bytes.is_empty()
        && bytes.len() <= MAX_PROJECT_ID_LEN
        && bytes[0].is_ascii_lowercase()
        && bytes[bytes.len() - 1] != b'-'
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');
    if !valid {
        return Err(ValidationError::new(
            "id",
            format!("{id:?} is not a valid project id"),
        ));
    }
    Ok(())
}

/// Validate a ServiceAccount ID: same grammar as Project IDs but without the
/// namespace length restriction.
pub fn validate_service_account_id(id: &str) -> Result<(), ValidationError> {
    let bytes = id.as_bytes();
    let valid = !bytes.is_empty()
        && bytes.len() <= MAX_JOB_NAME_LEN
        && bytes[0].is_ascii_lowercase()
        && bytes[bytes.len() - 1] != b'-'
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');
    if !valid {
        return Err(ValidationError::new(
            "id",
            format!("{id:?} is not a valid service account id"),
        ));
    }
    Ok(())
}
