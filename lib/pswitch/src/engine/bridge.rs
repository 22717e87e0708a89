// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The packet translation boundary.
//!
//! Two maps relay identity across the packet universes: `records`
//! holds the per-packet delivery context keyed by SimPacket uid, and
//! `relay` maps an EnginePacket id back to the uid its context is
//! filed under. The relay is one-shot: both entries are erased at the
//! moment of back-translation (or at discard, for packets that die in
//! the pipeline). It is not a cache.
//!
//! Clones never ride on their parent's entries. Every clone adopts
//! its own record at creation, inheriting the parent's delivery
//! context, so back-translation of a clone is indistinguishable from
//! that of an original.

use crate::engine::packet::EnginePacket;
use crate::engine::packet::SimPacket;
use std::collections::BTreeMap;

/// The delivery context recorded for each live SimPacket that has
/// crossed into the engine. Created at forward translation, consumed
/// exactly once at back-translation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PacketRecord {
    pub ingress_port: u16,
    pub protocol: u16,
    pub destination: u64,
    pub engine_id: u64,
}

/// How a clone is materialized from its parent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CloneKind {
    /// Current buffer, fields, and registers. Multicast replicas.
    Full,

    /// Current buffer, everything else reset. Egress mirroring.
    FreshFields,

    /// Pre-parse buffer snapshot, everything else reset. Ingress
    /// mirroring.
    PreParse,
}

#[derive(Debug)]
pub struct Bridge {
    records: BTreeMap<u64, PacketRecord>,
    relay: BTreeMap<u64, u64>,
    next_engine_id: u64,
    next_sim_uid: u64,
    headroom: usize,
}

impl Bridge {
    pub fn new(headroom: usize) -> Self {
        Self {
            records: BTreeMap::new(),
            relay: BTreeMap::new(),
            next_engine_id: 1,
            next_sim_uid: 1,
            headroom,
        }
    }

    /// Mint a uid for a simulator-side packet. The device layer and
    /// the boundary share this sequence so uids stay unique across
    /// everything the pipeline ever holds.
    pub fn next_sim_uid(&mut self) -> u64 {
        let uid = self.next_sim_uid;
        self.next_sim_uid += 1;
        uid
    }

    /// Forward translation. Consumes the SimPacket, copies its bytes
    /// into a fresh engine buffer (with headroom for header growth),
    /// and files the delivery context under the SimPacket's uid.
    pub fn to_engine(
        &mut self,
        pkt: SimPacket,
        ingress_port: u16,
        protocol: u16,
        destination: u64,
    ) -> EnginePacket {
        let engine_id = self.next_engine_id;
        self.next_engine_id += 1;

        let epkt = EnginePacket::new(engine_id, pkt.data(), self.headroom);
        let record =
            PacketRecord { ingress_port, protocol, destination, engine_id };
        self.records.insert(pkt.uid(), record);
        self.relay.insert(engine_id, pkt.uid());
        epkt
    }

    /// Backward translation. Builds a new SimPacket from the engine
    /// buffer and consumes both relay entries. A missing relay entry
    /// yields `None` for the record; the caller reports it and
    /// proceeds with a blank context.
    pub fn to_sim(
        &mut self,
        pkt: &EnginePacket,
    ) -> (SimPacket, Option<PacketRecord>) {
        let uid = self.next_sim_uid();
        let sim = SimPacket::new(uid, pkt.data().to_vec());

        let record = match self.relay.remove(&pkt.id()) {
            Some(old_uid) => self.records.remove(&old_uid),
            None => None,
        };

        (sim, record)
    }

    /// Create a clone of `src`, adopting a record that inherits the
    /// parent's delivery context. The parent's own entries are left
    /// untouched.
    pub fn clone_packet(
        &mut self,
        src: &EnginePacket,
        kind: CloneKind,
    ) -> EnginePacket {
        let parent = self
            .relay
            .get(&src.id())
            .and_then(|uid| self.records.get(uid))
            .copied()
            .unwrap_or_default();

        let engine_id = self.next_engine_id;
        self.next_engine_id += 1;

        let clone = match kind {
            CloneKind::Full => src.clone_full(engine_id),
            CloneKind::FreshFields => src.clone_no_fields(engine_id),
            CloneKind::PreParse => src.clone_preparse(engine_id),
        };

        let uid = self.next_sim_uid();
        self.records.insert(uid, PacketRecord { engine_id, ..parent });
        self.relay.insert(engine_id, uid);
        clone
    }

    /// Tear down the relay entries of a packet that dies without
    /// back-translation (any drop path). Idempotent.
    pub fn discard(&mut self, pkt: &EnginePacket) {
        if let Some(uid) = self.relay.remove(&pkt.id()) {
            self.records.remove(&uid);
        }
    }

    /// The number of live relay pairs. Zero whenever no packet is
    /// between forward and backward translation.
    pub fn live(&self) -> usize {
        debug_assert_eq!(self.records.len(), self.relay.len());
        self.relay.len()
    }
}
