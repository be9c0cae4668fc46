// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! List pagination primitives shared by collection endpoints.

use serde::{Deserialize, Serialize};

/// Default page size for list operations.
pub const DEFAULT_LIST_LIMIT: i64 = 20;

/// Maximum page size a client may request.
pub const MAX_LIST_LIMIT: i64 = 100;

/// Options controlling pagination of list operations.
///
/// `continue_token` is opaque to clients: it is the value returned by the
/// previous page, and an empty/absent value means "start from the beginning".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    /// Opaque continuation token from the previous page.
    #[serde(default, rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,
    /// Maximum number of items to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl ListOptions {
    /// Effective page size, clamped to `[1, MAX_LIST_LIMIT]`.
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit_defaults_and_clamps() {
        assert_eq!(ListOptions::default().effective_limit(), DEFAULT_LIST_LIMIT);
        let opts = ListOptions {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(opts.effective_limit(), 1);
        let opts = ListOptions {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(opts.effective_limit(), MAX_LIST_LIMIT);
    }
}
