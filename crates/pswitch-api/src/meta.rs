// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Per-packet metadata as seen by the pipeline and the match-action
//! engine's standard-metadata fields.

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

/// The egress spec value that requests a drop.
pub const PORT_DROP: u16 = 511;

/// How a packet instance came to exist.
///
/// The discriminants are part of the engine-visible metadata
/// vocabulary (the `instance_type` field) and must stay stable.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[repr(u8)]
pub enum InstanceType {
    /// An ordinary unicast packet.
    #[default]
    Normal = 0,

    /// A clone created during the ingress pass by a mirror session.
    IngressClone = 1,

    /// A clone created during the egress pass by a mirror session.
    EgressClone = 2,

    /// A packet re-injected at the parser after egress processing.
    Recirculate = 4,

    /// One copy produced by multicast replication.
    Replication = 5,

    /// A packet whose ingress pass was restarted on the pre-parse
    /// buffer.
    Resubmit = 6,
}

impl InstanceType {
    pub fn from_field(v: u64) -> Option<Self> {
        match v {
            0 => Some(Self::Normal),
            1 => Some(Self::IngressClone),
            2 => Some(Self::EgressClone),
            4 => Some(Self::Recirculate),
            5 => Some(Self::Replication),
            6 => Some(Self::Resubmit),
            _ => None,
        }
    }

    pub fn as_field(self) -> u64 {
        self as u64
    }
}

/// Which queue path an in-flight item takes through the Input Buffer,
/// and whether it is a real packet at all.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
pub enum PacketType {
    /// A fresh arrival from the device layer.
    #[default]
    Normal,

    /// Re-injected by the ingress resubmit path.
    Resubmit,

    /// Re-injected by the egress recirculate path.
    Recirculate,

    /// A termination signal; carries no packet data.
    Sentinel,
}

impl Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            PacketType::Normal => "normal",
            PacketType::Resubmit => "resubmit",
            PacketType::Recirculate => "recirculate",
            PacketType::Sentinel => "sentinel",
        };
        write!(f, "{}", s)
    }
}

/// The parser's verdict on a packet, when the engine exposes one.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize,
)]
#[repr(u8)]
pub enum ParserError {
    #[default]
    None = 0,
    Checksum = 1,
    Other = 2,
}

impl ParserError {
    pub fn from_field(v: u64) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Checksum,
            _ => Self::Other,
        }
    }

    pub fn as_field(self) -> u64 {
        self as u64
    }
}

/// The per-packet state that travels with a packet across both packet
/// universes.
///
/// One `Metadata` instance is owned per in-flight queue item. The
/// engine-facing fields mirror the standard metadata the match-action
/// engine reads and writes; the bookkeeping fields carry what the
/// simulator side needs to deliver the packet once it leaves the
/// pipeline. All timestamp fields are microseconds of simulated time.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Metadata {
    /// Port the packet arrived on.
    pub ingress_port: u16,

    /// The ingress match-action decision: an egress port, or
    /// [`PORT_DROP`].
    pub egress_spec: u16,

    /// The resolved egress port, bound after the decision is read.
    pub egress_port: u16,

    pub instance_type: InstanceType,

    /// Packet length in bytes as accounted by the engine.
    pub packet_length: u64,

    /// When the packet entered its egress queue class.
    pub enq_timestamp: u64,

    /// Depth of the egress queue class at enqueue time.
    pub enq_qdepth: u32,

    /// Time spent in the egress queue class.
    pub deq_timedelta: u64,

    /// Depth of the egress queue class at dequeue time.
    pub deq_qdepth: u32,

    /// When the ingress pass began.
    pub ingress_timestamp: u64,

    /// When the egress pass began.
    pub egress_timestamp: u64,

    /// Multicast group id; 0 means no replication.
    pub mcast_grp: u16,

    /// Replication id distinguishing multicast copies.
    pub egress_rid: u16,

    pub checksum_error: bool,

    pub parser_error: ParserError,

    /// Egress scheduling class, `0..priorities`; lower is served
    /// first.
    pub priority: u8,

    /// Whether the engine exposes the queueing metadata fields for
    /// this packet. Set at ingress enqueue; when false the enq/deq
    /// fields above stay zero.
    pub queueing: bool,

    // Simulation bookkeeping, never read by the match-action engine.
    pub packet_type: PacketType,

    /// Simulator-side packet uid, for tracing.
    pub sim_uid: u64,

    /// Engine-side packet id, for tracing.
    pub engine_id: u64,

    /// Link-layer protocol number recovered at transmission.
    pub protocol: u16,

    /// Destination address recovered at transmission.
    pub destination: u64,
}
