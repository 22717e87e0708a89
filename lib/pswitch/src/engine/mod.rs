// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The pswitch engine.

pub mod bridge;
pub mod egress_queue;
pub mod input_queue;
pub mod meta;
pub mod mirror;
pub mod packet;
pub mod pipeline;

use crate::api::Metadata;
use crate::api::PacketType;
use crate::time::SimTime;
use packet::EnginePacket;
use packet::FieldSet;
use packet::SimPacket;

/// One multicast copy requested by the replication engine: which port
/// it leaves on and the replication id that distinguishes it from its
/// siblings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Replica {
    pub egress_port: u16,
    pub rid: u16,
}

/// A parse failure reported by the match-action engine.
///
/// Parse faults are per-packet and non-fatal: the pipeline records
/// them in the packet's metadata and keeps processing, leaving the
/// decision to the engine's tables.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseFault {
    Checksum,
    Other,
}

/// The match-action engine the pipeline drives.
///
/// The pipeline is a generalized orchestrator: it owns queueing,
/// translation, and the side-effect state machine, but it does not
/// dictate what the tables do. That is left to the engine
/// implementation bound here, which supplies parsing, the ingress and
/// egress table pipelines, deparsing, field-list handling, learning,
/// and multicast group resolution.
///
/// All decisions flow through the packet's named-field workspace: the
/// engine reads and writes fields during `parse`/`*_apply`, and the
/// pipeline reads the standard decision fields (see
/// [`meta::fields`]) afterwards.
pub trait SwitchImpl {
    /// Parse the packet buffer, populating the field workspace.
    fn parse(&mut self, pkt: &mut EnginePacket) -> Result<(), ParseFault>;

    /// Run the ingress table pipeline.
    fn ingress_apply(&mut self, pkt: &mut EnginePacket);

    /// Run the egress table pipeline.
    fn egress_apply(&mut self, pkt: &mut EnginePacket);

    /// Re-serialize the field workspace into the packet buffer.
    fn deparse(&mut self, pkt: &mut EnginePacket);

    /// Copy the fields named by field list `list_id` from `src` into
    /// `dst`. Unknown list ids copy nothing.
    fn copy_fields(&self, src: &FieldSet, dst: &mut FieldSet, list_id: u32);

    /// Forward a learning notification. Fire and forget.
    fn learn(&mut self, list_id: u32, pkt: &EnginePacket);

    /// Resolve a multicast group to its copies. An empty list means
    /// the group is unprogrammed and the packet is discarded.
    fn replicate(&mut self, mgid: u16) -> Vec<Replica>;

    /// Length in bytes of the transport framing header the deparser
    /// prepends for pipeline transport, stripped before transmission.
    fn framing_len(&self) -> usize {
        0
    }
}

/// One in-flight unit of work, exclusively owned by exactly one queue
/// (Input Buffer or Egress Queue Buffer) at a time; ownership
/// transfers on dequeue.
#[derive(Clone, Debug)]
pub struct QueueItem {
    pub packet: SimPacket,
    pub ptype: PacketType,
    pub meta: Metadata,

    /// Named fields that must survive this queue crossing: the
    /// field-list copy on resubmit/recirculate re-entry, or the
    /// non-standard fields on the ingress→egress crossing.
    pub carried: FieldSet,

    pub enqueued_at: SimTime,
}

impl QueueItem {
    /// The termination signal. Carries no packet data.
    pub fn sentinel() -> Self {
        let mut meta = Metadata::default();
        meta.packet_type = PacketType::Sentinel;
        Self {
            packet: SimPacket::new(0, Vec::new()),
            ptype: PacketType::Sentinel,
            meta,
            carried: FieldSet::default(),
            enqueued_at: SimTime::ZERO,
        }
    }
}
