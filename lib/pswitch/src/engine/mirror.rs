// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Mirroring sessions.
//!
//! A small bounded table mapping session ids to clone destinations.
//! The control plane adds, overwrites, and deletes sessions; the
//! pipeline only reads them when a packet requests a clone.

use crate::api::MirrorSession;
use crate::api::SwitchError;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct MirrorTable {
    sessions: BTreeMap<u16, MirrorSession>,
    max: u16,
}

impl MirrorTable {
    pub fn new(max: u16) -> Self {
        Self { sessions: BTreeMap::new(), max }
    }

    /// Create or overwrite a session.
    pub fn add(
        &mut self,
        id: u16,
        cfg: MirrorSession,
    ) -> Result<(), SwitchError> {
        if id >= self.max {
            return Err(SwitchError::BadMirrorId { id, max: self.max });
        }

        self.sessions.insert(id, cfg);
        Ok(())
    }

    pub fn delete(&mut self, id: u16) -> Result<(), SwitchError> {
        if id >= self.max {
            return Err(SwitchError::BadMirrorId { id, max: self.max });
        }

        match self.sessions.remove(&id) {
            Some(_) => Ok(()),
            None => Err(SwitchError::MirrorNotFound(id)),
        }
    }

    pub fn get(&self, id: u16) -> Option<MirrorSession> {
        self.sessions.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
