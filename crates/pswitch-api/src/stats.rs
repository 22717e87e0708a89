// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Cumulative pipeline counters.

use serde::Deserialize;
use serde::Serialize;

/// Cumulative counters for a single pipeline.
///
/// Every per-packet event that does not surface as a return value is
/// visible here. Counters only ever increase; a snapshot is a plain
/// copy.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PipelineStats {
    /// The number of packets handed in by the device layer.
    pub in_received: u64,

    /// The number of arrivals dropped because the Input Buffer was at
    /// capacity.
    pub in_admission_drops: u64,

    /// The number of completed ingress passes.
    pub ingress_passes: u64,

    /// The number of ingress packets dropped because the match-action
    /// decision was the drop spec.
    pub ingress_policy_drops: u64,

    /// The number of packets dropped for carrying a priority at or
    /// above the configured priority count.
    pub priority_range_drops: u64,

    /// The number of packets dropped for an egress spec naming a
    /// nonexistent port.
    pub port_range_drops: u64,

    /// The number of packets dropped because their egress queue class
    /// was at capacity.
    pub queue_admission_drops: u64,

    /// The number of clones created by ingress mirror sessions.
    pub ingress_clones: u64,

    /// The number of packets whose ingress pass was restarted via
    /// resubmission.
    pub resubmits: u64,

    /// The number of multicast copies enqueued toward egress.
    pub multicast_replicas: u64,

    /// The number of learning notifications forwarded to the engine.
    pub learn_notifies: u64,

    /// The number of completed egress passes.
    pub egress_passes: u64,

    /// The number of egress packets dropped because the match-action
    /// decision was the drop spec.
    pub egress_policy_drops: u64,

    /// The number of clones created by egress mirror sessions.
    pub egress_clones: u64,

    /// The number of packets re-injected at the parser via
    /// recirculation.
    pub recirculates: u64,

    /// The number of packets handed to the device layer for
    /// transmission.
    pub transmits: u64,

    /// The number of back-translations that found no relay entry and
    /// proceeded with a blank record.
    pub relay_misses: u64,
}
