// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The Input Buffer.
//!
//! A two-tier admission queue between packet arrival and ingress
//! processing. The high tier holds re-injected items (resubmit,
//! recirculate, and the stop sentinel); the low tier holds fresh
//! arrivals. Strict priority between tiers, FIFO within a tier.

use crate::api::PacketType;
use crate::engine::QueueItem;
use std::collections::VecDeque;

#[derive(Debug)]
pub struct InputBuffer {
    high: VecDeque<QueueItem>,
    low: VecDeque<QueueItem>,

    /// Total item bound across both tiers; `None` is unbounded.
    capacity: Option<usize>,
}

impl InputBuffer {
    pub fn new(capacity: Option<usize>) -> Self {
        Self { high: VecDeque::new(), low: VecDeque::new(), capacity }
    }

    /// Append the item to the tier matching its packet type. A full
    /// buffer gives the item back; the caller reports the drop. Never
    /// blocks.
    ///
    /// The bound applies to fresh arrivals only. Re-injected items
    /// and the sentinel are already owned by the pipeline and always
    /// admit.
    pub fn enqueue(&mut self, item: QueueItem) -> Result<(), QueueItem> {
        match item.ptype {
            PacketType::Normal => {
                if let Some(cap) = self.capacity {
                    if self.low.len() >= cap {
                        return Err(item);
                    }
                }
                self.low.push_back(item);
            }
            PacketType::Resubmit
            | PacketType::Recirculate
            | PacketType::Sentinel => self.high.push_back(item),
        }

        Ok(())
    }

    /// Remove and return the front of the high tier, else the front
    /// of the low tier, else `None`. Callers re-poll or are
    /// event-driven; there is no blocking dequeue.
    pub fn dequeue(&mut self) -> Option<QueueItem> {
        self.high.pop_front().or_else(|| self.low.pop_front())
    }

    /// The item the next `dequeue` would return.
    pub fn front(&self) -> Option<&QueueItem> {
        self.high.front().or_else(|| self.low.front())
    }

    pub fn high_len(&self) -> usize {
        self.high.len()
    }

    pub fn low_len(&self) -> usize {
        self.low.len()
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.low.is_empty()
    }
}
