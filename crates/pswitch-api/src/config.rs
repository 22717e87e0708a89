// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Pipeline configuration and the mirror-session config type.

use crate::SwitchError;
use serde::Deserialize;
use serde::Serialize;

/// Default number of switch ports.
pub const DEF_PORTS: u16 = 4;
/// Default number of scheduling priorities per port.
pub const DEF_PRIORITIES: u8 = 8;
/// Default per-class queue capacity, in packets.
pub const DEF_QUEUE_CAPACITY: usize = 1000;
/// Default per-class service rate, in packets per second.
pub const DEF_QUEUE_RATE_PPS: u64 = 1000;
/// Default bound on mirror session ids.
pub const DEF_MIRROR_MAX: u16 = 256;

/// How the Egress Queue Buffer picks the next port to serve.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
pub enum PortSelectPolicy {
    /// Uniform-random choice among ports not yet tried during this
    /// dequeue attempt.
    #[default]
    Random,

    /// Deterministic round robin across ports.
    RoundRobin,
}

/// Capacity and pacing for one `(port, priority)` queue class.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct QueueClassConfig {
    /// Admission limit, in packets.
    pub capacity: usize,

    /// Service rate in packets per second. A rate of 0 paces items at
    /// one per millisecond.
    pub rate_pps: u64,
}

impl Default for QueueClassConfig {
    fn default() -> Self {
        Self { capacity: DEF_QUEUE_CAPACITY, rate_pps: DEF_QUEUE_RATE_PPS }
    }
}

/// Static pipeline configuration, validated once at creation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SwitchConfig {
    /// Number of switch ports, `P`.
    pub ports: u16,

    /// Number of scheduling priorities per port, `N`. Priority values
    /// at or above this count are a per-packet range error.
    pub priorities: u8,

    /// Initial configuration applied to every egress queue class.
    pub queue: QueueClassConfig,

    /// Input Buffer bound in items; `None` is unbounded.
    pub input_capacity: Option<usize>,

    /// Egress port-selection policy.
    pub policy: PortSelectPolicy,

    /// Bound on mirror session ids.
    pub mirror_max: u16,

    /// Seed for the randomized port-selection policy, so simulation
    /// runs reproduce.
    pub seed: u64,

    /// Extra buffer bytes reserved at engine-packet creation to allow
    /// header growth without reallocation.
    pub headroom: usize,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            ports: DEF_PORTS,
            priorities: DEF_PRIORITIES,
            queue: QueueClassConfig::default(),
            input_capacity: None,
            policy: PortSelectPolicy::default(),
            mirror_max: DEF_MIRROR_MAX,
            seed: 7,
            headroom: 128,
        }
    }
}

impl SwitchConfig {
    /// Validate the configuration. A bad configuration is fatal at
    /// startup; nothing here is recoverable per-packet.
    pub fn validate(&self) -> Result<(), SwitchError> {
        if self.ports == 0 {
            return Err(SwitchError::BadConfig("ports must be > 0".into()));
        }

        if self.priorities == 0 {
            return Err(SwitchError::BadConfig(
                "priorities must be > 0".into(),
            ));
        }

        if self.queue.capacity == 0 {
            return Err(SwitchError::BadConfig(
                "queue capacity must be > 0".into(),
            ));
        }

        if self.mirror_max == 0 {
            return Err(SwitchError::BadConfig(
                "mirror_max must be > 0".into(),
            ));
        }

        Ok(())
    }
}

/// One mirroring session: where clones for a given session id go.
///
/// Exactly what the control plane programs: a session may point at a
/// multicast group, an egress port, or both (the group takes
/// precedence when both are valid).
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
pub struct MirrorSession {
    pub mgid_valid: bool,
    pub mgid: u16,
    pub egress_port_valid: bool,
    pub egress_port: u16,
}
