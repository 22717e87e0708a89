// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The two packet universes.
//!
//! A [`SimPacket`] is the simulator's packet: an opaque byte buffer
//! with a simulator-assigned uid. An [`EnginePacket`] is the
//! match-action engine's packet: its own buffer, its own id sequence,
//! and a mutable named-field workspace the engine reads and writes
//! during parsing and table application. The two id spaces are
//! independent; [`super::bridge`] owns the mapping between them.

use std::collections::BTreeMap;

/// Number of per-packet registers.
pub const NUM_REGS: usize = 4;

/// Register holding the engine's length accounting for the packet.
pub const REG_PACKET_LENGTH: usize = 0;

/// The simulator's native packet. Single-owner: it is moved between
/// the device layer, the queues, and the translation boundary, never
/// shared.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SimPacket {
    uid: u64,
    data: Vec<u8>,
}

impl SimPacket {
    pub fn new(uid: u64, data: Vec<u8>) -> Self {
        Self { uid, data }
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Remove the first `n` bytes, or clear the buffer if it is
    /// shorter than `n`.
    pub fn strip_front(&mut self, n: usize) {
        let n = n.min(self.data.len());
        self.data.drain(..n);
    }
}

/// The named-field workspace of an [`EnginePacket`].
///
/// Parsed header values and switch metadata live here as flat
/// `name -> value` pairs. The engine owns the vocabulary; the
/// pipeline only touches the standard names in
/// [`super::meta::fields`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldSet {
    map: BTreeMap<String, u64>,
}

impl FieldSet {
    pub fn has(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.map.get(name).copied()
    }

    pub fn set(&mut self, name: &str, val: u64) {
        self.map.insert(name.to_string(), val);
    }

    /// Read and clear a field in one step. The side-effect request
    /// fields work this way: acting on one consumes it.
    pub fn take(&mut self, name: &str) -> Option<u64> {
        self.map.remove(name)
    }

    /// Copy every field of `other` into `self`, overwriting.
    pub fn merge(&mut self, other: &FieldSet) {
        for (name, val) in &other.map {
            self.map.insert(name.clone(), *val);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.map.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The match-action engine's native packet.
///
/// Created only through [`super::bridge::Bridge`], which owns the id
/// sequence. The buffer is allocated with headroom so header growth
/// does not reallocate. `saved` holds the pre-parse buffer snapshot
/// that the resubmit and ingress-mirror paths restart from.
#[derive(Clone, Debug)]
pub struct EnginePacket {
    id: u64,
    data: Vec<u8>,
    saved: Option<Vec<u8>>,
    fields: FieldSet,
    regs: [u64; NUM_REGS],
}

impl EnginePacket {
    pub(crate) fn new(id: u64, bytes: &[u8], headroom: usize) -> Self {
        let mut data = Vec::with_capacity(bytes.len() + headroom);
        data.extend_from_slice(bytes);
        Self {
            id,
            data,
            saved: None,
            fields: FieldSet::default(),
            regs: [0; NUM_REGS],
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut FieldSet {
        &mut self.fields
    }

    /// Snapshot the current buffer. Overwrites any previous snapshot.
    pub fn save(&mut self) {
        self.saved = Some(self.data.clone());
    }

    /// Rewind the buffer to the last snapshot. The snapshot is kept;
    /// a clone taken afterwards still sees it. Returns false if no
    /// snapshot exists.
    pub fn restore_saved(&mut self) -> bool {
        match &self.saved {
            Some(saved) => {
                self.data = saved.clone();
                true
            }
            None => false,
        }
    }

    pub fn saved(&self) -> Option<&[u8]> {
        self.saved.as_deref()
    }

    pub fn reg(&self, idx: usize) -> u64 {
        self.regs[idx]
    }

    pub fn set_reg(&mut self, idx: usize, val: u64) {
        self.regs[idx] = val;
    }

    /// Full clone: current buffer, field workspace, and registers.
    /// Multicast replicas are made this way.
    pub(crate) fn clone_full(&self, id: u64) -> Self {
        Self {
            id,
            data: self.data.clone(),
            saved: self.saved.clone(),
            fields: self.fields.clone(),
            regs: self.regs,
        }
    }

    /// Clone with the field workspace and registers reset: current
    /// buffer only. Egress mirroring starts from this.
    pub(crate) fn clone_no_fields(&self, id: u64) -> Self {
        Self {
            id,
            data: self.data.clone(),
            saved: None,
            fields: FieldSet::default(),
            regs: [0; NUM_REGS],
        }
    }

    /// Clone for re-parse scenarios: the pre-parse buffer snapshot
    /// (falling back to the current buffer if none was taken) with a
    /// fresh field workspace. Ingress mirroring starts from this.
    pub(crate) fn clone_preparse(&self, id: u64) -> Self {
        let data = self.saved.clone().unwrap_or_else(|| self.data.clone());
        Self {
            id,
            data,
            saved: None,
            fields: FieldSet::default(),
            regs: [0; NUM_REGS],
        }
    }
}
