// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Events and their embedded Workers and Jobs.
//!
//! An Event is the unit of work accepted from gateways. It is immutable after
//! creation except for the `worker` sub-document (and the `jobs` map inside
//! it) and the source-specific state returned to the gateway.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phases::Phase;

/// A fact submitted by a gateway, matched against Projects and executed by a
/// Worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Server-assigned identifier (ULID). Empty on creation requests.
    #[serde(default)]
    pub id: String,
    /// The Project this Event was materialized for. Absent on a creation
    /// request means broadcast: one materialized Event per subscribed Project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// The upstream system that produced this Event, e.g. `forge.sh/cli`.
    pub source: String,
    /// The kind of occurrence within the source, e.g. `exec` or `push`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Source-defined key/value pairs that narrow subscription matching.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub qualifiers: BTreeMap<String, String>,
    /// Free-form key/value pairs usable as list filters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// One-line human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_title: Option<String>,
    /// Longer human-readable summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_title: Option<String>,
    /// Opaque payload handed through to the Worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Opaque state the originating gateway reads back after the Worker
    /// reaches a terminal phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_state: Option<SourceState>,
    /// When the server accepted the Event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// The Worker that executes this Event. Exactly one per Event.
    #[serde(default)]
    pub worker: Worker,
}

/// Opaque, source-specific state attached to an Event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceState {
    /// Source-defined key/value pairs.
    #[serde(default)]
    pub state: BTreeMap<String, String>,
}

/// Filters applied when listing Events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsSelector {
    /// Restrict to Events belonging to one Project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Restrict to Events whose worker is in one of these phases. Empty means
    /// any phase.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub worker_phases: Vec<Phase>,
}

/// One page of Events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventList {
    pub items: Vec<Event>,
    /// Token for fetching the next page; absent on the last page.
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,
}

/// The per-Event driver process that interprets the pipeline and creates
/// Jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    /// Snapshot of the Project's worker template at Event creation time.
    #[serde(default)]
    pub spec: WorkerSpec,
    #[serde(default)]
    pub status: WorkerStatus,
    /// Jobs spawned by this Worker, keyed by name (unique per Worker).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub jobs: BTreeMap<String, Job>,
}

/// How a Worker pod is to be run. Projects carry this as their worker
/// template; Events carry a frozen copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    /// The worker container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerSpec>,
    /// Log verbosity passed to the worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Files projected into the worker's config directory, keyed by file
    /// name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub default_config_files: BTreeMap<String, String>,
}

/// A container image plus how to invoke it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

/// Observed state of a Worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub phase: Phase,
    /// Set when the worker reaches RUNNING.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    /// Set when the worker reaches a terminal phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<DateTime<Utc>>,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Pending,
            started: None,
            ended: None,
        }
    }
}

/// A container (plus optional sidecars) spawned by a Worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub spec: JobSpec,
    #[serde(default)]
    pub status: JobStatus,
}

/// How a Job pod is to be run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// The container whose exit status decides the Job's fate.
    pub primary_container: JobContainerSpec,
    /// Helper containers that run alongside the primary and are killed when
    /// it exits.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sidecar_containers: BTreeMap<String, JobContainerSpec>,
    /// Execution deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// A Job container: image, invocation, environment, and config mounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContainerSpec {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    /// Config files mounted into the container, keyed by file name, valued
    /// by mount path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config_mounts: BTreeMap<String, String>,
}

/// Observed state of a Job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<DateTime<Utc>>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Pending,
            started: None,
            ended: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::json!({
            "source": "forge.sh/cli",
            "type": "exec",
            "projectId": "hello",
            "qualifiers": {"branch": "main"}
        });
        let event: Event = serde_json::from_value(json).unwrap();
        assert_eq!(event.source, "forge.sh/cli");
        assert_eq!(event.event_type, "exec");
        assert_eq!(event.project_id.as_deref(), Some("hello"));
        assert_eq!(event.worker.status.phase, Phase::Pending);

        let out = serde_json::to_value(&event).unwrap();
        assert_eq!(out["type"], "exec");
        assert_eq!(out["worker"]["status"]["phase"], "PENDING");
        // Empty jobs map stays off the wire.
        assert!(out["worker"].get("jobs").is_none());
    }

    #[test]
    fn test_worker_status_defaults_to_pending() {
        let status = WorkerStatus::default();
        assert_eq!(status.phase, Phase::Pending);
        assert!(status.started.is_none());
        assert!(status.ended.is_none());
    }
}
