// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Projects: tenant configuration, subscriptions, and substrate bindings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Event, WorkerSpec};

/// A tenant configuration: event subscriptions, a worker template, and an
/// isolated substrate namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique, human-chosen identifier. Doubles as the stem of the
    /// substrate namespace name, so it must be a DNS-safe slug.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub spec: ProjectSpec,
    /// Substrate resources backing this Project. Populated by the server on
    /// first provisioning; immutable afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubernetesConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// User-editable portion of a Project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    /// Which Events this Project wants Workers for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_subscriptions: Vec<EventSubscription>,
    /// Template copied into each materialized Event's Worker spec.
    #[serde(default)]
    pub worker_template: WorkerSpec,
}

/// A predicate over incoming Events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSubscription {
    /// Exact source match.
    pub source: String,
    /// Event types of interest within the source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    /// Every qualifier listed here must be present on the Event with an
    /// equal value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub qualifiers: BTreeMap<String, String>,
    /// Informational labels; not part of the match predicate.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl EventSubscription {
    /// Whether this subscription matches the given Event: equal source, the
    /// Event's type is one of `types`, and `qualifiers` is a subset of the
    /// Event's qualifiers.
    pub fn matches(&self, event: &Event) -> bool {
        self.source == event.source
            && self.types.iter().any(|t| t == &event.event_type)
            && self
                .qualifiers
                .iter()
                .all(|(k, v)| event.qualifiers.get(k) == Some(v))
    }
}

impl Project {
    /// Whether any of this Project's subscriptions matches the Event.
    pub fn subscribes_to(&self, event: &Event) -> bool {
        self.spec.event_subscriptions.iter().any(|s| s.matches(event))
    }
}

/// Marker returned in place of secret values on list.
pub const REDACTED: &str = "*** REDACTED ***";

/// A single project secret. Values only ever travel client -> server; list
/// responses carry [`REDACTED`] in place of the value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    pub key: String,
    pub value: String,
}

/// Names of the substrate resources provisioned for a Project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    /// The Project's isolated namespace.
    pub namespace: String,
    /// Service account Workers and Jobs run as.
    pub worker_service_account: String,
    /// Well-known secrets created inside the namespace.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(source: &str, event_type: &str, qualifiers: &[(&str, &str)]) -> Event {
        Event {
            source: source.to_string(),
            event_type: event_type.to_string(),
            qualifiers: qualifiers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    fn subscription(source: &str, types: &[&str], qualifiers: &[(&str, &str)]) -> EventSubscription {
        EventSubscription {
            source: source.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            qualifiers: qualifiers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn test_subscription_matches_source_and_type() {
        let sub = subscription("github.com", &["push", "pull_request"], &[]);
        assert!(sub.matches(&event("github.com", "push", &[])));
        assert!(sub.matches(&event("github.com", "pull_request", &[])));
        assert!(!sub.matches(&event("gitlab.com", "push", &[])));
        assert!(!sub.matches(&event("github.com", "issue", &[])));
    }

    #[test]
    fn test_subscription_qualifiers_are_a_subset_predicate() {
        let sub = subscription("github.com", &["push"], &[("repo", "a/b")]);
        // Event carries the required qualifier plus extras: match.
        assert!(sub.matches(&event("github.com", "push", &[("repo", "a/b"), ("ref", "main")])));
        // Missing or unequal qualifier: no match.
        assert!(!sub.matches(&event("github.com", "push", &[])));
        assert!(!sub.matches(&event("github.com", "push", &[("repo", "c/d")])));
    }

    #[test]
    fn test_project_subscribes_through_any_subscription() {
        let project = Project {
            id: "p1".to_string(),
            spec: ProjectSpec {
                event_subscriptions: vec![
                    subscription("github.com", &["push"], &[]),
                    subscription("schedule.sh", &["tick"], &[]),
                ],
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(project.subscribes_to(&event("schedule.sh", "tick", &[])));
        assert!(!project.subscribes_to(&event("github.com", "issue", &[])));
    }
}
