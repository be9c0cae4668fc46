// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker and Job phase machine.
//!
//! Workers and Jobs share one lifecycle graph. All transitions allowed by the
//! control plane are listed in [`TRANSITIONS`], together with the component
//! that is allowed to drive each edge; services consult the table through
//! [`Phase::transition`] instead of scattering phase checks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a Worker or a Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Queued; nothing has been launched on the substrate yet.
    Pending,
    /// The scheduler has begun launching the pod.
    Starting,
    /// The pod reported ready and is executing.
    Running,
    /// Finished with a zero exit status.
    Succeeded,
    /// Finished with a non-zero exit status.
    Failed,
    /// Killed by cancellation before or during execution.
    Aborted,
    /// Exceeded its execution deadline.
    TimedOut,
    /// The substrate could not place the pod.
    SchedulingFailed,
}

impl Phase {
    /// All phases, in lifecycle order.
    pub const ALL: [Phase; 8] = [
        Phase::Pending,
        Phase::Starting,
        Phase::Running,
        Phase::Succeeded,
        Phase::Failed,
        Phase::Aborted,
        Phase::TimedOut,
        Phase::SchedulingFailed,
    ];

    /// Whether this phase is final. Terminal phases reject all further
    /// transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Phase::Succeeded
                | Phase::Failed
                | Phase::Aborted
                | Phase::TimedOut
                | Phase::SchedulingFailed
        )
    }

    /// The wire representation of this phase (SCREAMING_SNAKE_CASE).
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "PENDING",
            Phase::Starting => "STARTING",
            Phase::Running => "RUNNING",
            Phase::Succeeded => "SUCCEEDED",
            Phase::Failed => "FAILED",
            Phase::Aborted => "ABORTED",
            Phase::TimedOut => "TIMED_OUT",
            Phase::SchedulingFailed => "SCHEDULING_FAILED",
        }
    }

    /// Parse a phase from its wire representation.
    pub fn parse(s: &str) -> Option<Phase> {
        Phase::ALL.iter().copied().find(|p| p.as_str() == s)
    }

    /// Look up the transition from `self` to `to`, returning the component
    /// allowed to drive it, or `None` when the edge is not in the graph.
    pub fn transition(&self, to: Phase) -> Option<Driver> {
        TRANSITIONS
            .iter()
            .find(|(from, target, _)| *from == *self && *target == to)
            .map(|(_, _, driver)| *driver)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The component allowed to drive a given transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// The scheduler daemon, which launches pods.
    Scheduler,
    /// The observer daemon, which reflects pod status back.
    Observer,
    /// The events service itself, on explicit cancellation.
    Canceler,
}

/// The full transition graph for Workers and Jobs.
pub const TRANSITIONS: &[(Phase, Phase, Driver)] = &[
    (Phase::Pending, Phase::Starting, Driver::Scheduler),
    (Phase::Pending, Phase::Aborted, Driver::Canceler),
    (Phase::Starting, Phase::Running, Driver::Observer),
    (Phase::Starting, Phase::SchedulingFailed, Driver::Observer),
    (Phase::Running, Phase::Succeeded, Driver::Observer),
    (Phase::Running, Phase::Failed, Driver::Observer),
    (Phase::Running, Phase::Aborted, Driver::Observer),
    (Phase::Running, Phase::TimedOut, Driver::Observer),
];
