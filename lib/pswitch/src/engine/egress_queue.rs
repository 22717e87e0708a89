// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The Egress Queue Buffer.
//!
//! A 2-D array of rate-limited FIFO classes indexed by
//! `(port, priority)`, separating ingress completion from egress
//! transmission. Each class paces service by stamping every admitted
//! item with an eligible-send time of `now + 1/rate`. Dequeue picks a
//! port per the configured policy, then serves the lowest-numbered
//! priority class at that port whose head is eligible.
//!
//! Peek/dequeue coherence under the random policy is kept by the
//! `marked` field: the first successful peek records the port it
//! found, and the next dequeue consumes from that port instead of
//! re-randomizing. The mark is buffer state, never derived per call.

use crate::api::PortSelectPolicy;
use crate::api::QueueClassConfig;
use crate::api::SwitchError;
use crate::engine::QueueItem;
use crate::time::NANOS;
use crate::time::SimTime;
use core::time::Duration;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug)]
struct PacedItem {
    item: QueueItem,
    eligible: SimTime,
}

#[derive(Debug)]
struct ClassQueue {
    fifo: VecDeque<PacedItem>,
    capacity: usize,
    rate_pps: u64,
    delay: Duration,
}

impl ClassQueue {
    fn new(cfg: QueueClassConfig) -> Self {
        let mut class = Self {
            fifo: VecDeque::new(),
            capacity: cfg.capacity,
            rate_pps: 0,
            delay: Duration::ZERO,
        };
        class.set_rate(cfg.rate_pps);
        class
    }

    /// Only affects items admitted afterwards; already-queued items
    /// keep the eligible time they were stamped with.
    fn set_rate(&mut self, pps: u64) {
        self.rate_pps = pps;
        self.delay = if pps == 0 {
            Duration::from_millis(1)
        } else {
            Duration::from_nanos(NANOS / pps)
        };
    }
}

/// Observable state of one queue class.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClassSnap {
    pub port: u16,
    pub priority: u8,
    pub depth: usize,
    pub capacity: usize,
    pub rate_pps: u64,
}

#[derive(Debug)]
pub struct EgressQueueBuffer {
    classes: Vec<Vec<ClassQueue>>,
    ports: u16,
    priorities: u8,
    policy: PortSelectPolicy,
    rr_next: u16,
    marked: Option<u16>,
    rng: StdRng,
}

impl EgressQueueBuffer {
    pub fn new(
        ports: u16,
        priorities: u8,
        cfg: QueueClassConfig,
        policy: PortSelectPolicy,
        seed: u64,
    ) -> Self {
        let classes = (0..ports)
            .map(|_| {
                (0..priorities).map(|_| ClassQueue::new(cfg)).collect()
            })
            .collect();

        Self {
            classes,
            ports,
            priorities,
            policy,
            rr_next: 0,
            marked: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Admit an item into the class named by its metadata. A full
    /// class gives the item back; the caller reports the drop. The
    /// caller has already range-checked port and priority.
    pub fn enqueue(
        &mut self,
        item: QueueItem,
        now: SimTime,
    ) -> Result<(), QueueItem> {
        let port = item.meta.egress_port as usize;
        let prio = item.meta.priority as usize;
        debug_assert!(port < self.ports as usize);
        debug_assert!(prio < self.priorities as usize);

        let class = &mut self.classes[port][prio];
        if class.fifo.len() >= class.capacity {
            return Err(item);
        }

        let eligible = now + class.delay;
        class.fifo.push_back(PacedItem { item, eligible });
        Ok(())
    }

    /// Remove and return the next item to serve, or `None` when no
    /// class anywhere has an eligible head.
    ///
    /// A pending peek mark short-circuits port selection so the item
    /// the peek reported is the item returned. Otherwise ports are
    /// tried per policy, each port at most once per call, until one
    /// yields or all are exhausted.
    pub fn dequeue(&mut self, now: SimTime) -> Option<QueueItem> {
        if let Some(port) = self.marked.take() {
            if let Some(prio) = self.ready_prio(port, now) {
                self.rr_next = (port + 1) % self.ports;
                return self.pop(port, prio);
            }
            // Stale mark; fall through to a full scan.
        }

        match self.policy {
            PortSelectPolicy::Random => {
                let mut untried: Vec<u16> = (0..self.ports).collect();
                while !untried.is_empty() {
                    let idx = self.rng.random_range(0..untried.len());
                    let port = untried.swap_remove(idx);
                    if let Some(prio) = self.ready_prio(port, now) {
                        return self.pop(port, prio);
                    }
                }
                None
            }
            PortSelectPolicy::RoundRobin => {
                for off in 0..self.ports {
                    let port = (self.rr_next + off) % self.ports;
                    if let Some(prio) = self.ready_prio(port, now) {
                        self.rr_next = (port + 1) % self.ports;
                        return self.pop(port, prio);
                    }
                }
                None
            }
        }
    }

    /// Return the item the next `dequeue` would return, without
    /// removing it, and mark its port so the two agree even under the
    /// random policy.
    pub fn peek(&mut self, now: SimTime) -> Option<&QueueItem> {
        let (port, prio) = self.find(now)?;
        self.marked = Some(port);
        self.classes[port as usize][prio as usize]
            .fifo
            .front()
            .map(|paced| &paced.item)
    }

    /// Current depth of one `(port, priority)` class.
    pub fn class_depth(&self, port: u16, priority: u8) -> usize {
        self.classes[port as usize][priority as usize].fifo.len()
    }

    /// Current depth across all priority classes of one port.
    pub fn port_depth(&self, port: u16) -> usize {
        self.classes[port as usize].iter().map(|c| c.fifo.len()).sum()
    }

    pub fn len(&self) -> usize {
        (0..self.ports).map(|p| self.port_depth(p)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reconfigure the service rate of one class, or of every class
    /// at the port when `priority` is `None`.
    pub fn set_rate(
        &mut self,
        port: u16,
        priority: Option<u8>,
        pps: u64,
    ) -> Result<(), SwitchError> {
        self.check(port, priority)?;
        match priority {
            Some(prio) => {
                self.classes[port as usize][prio as usize].set_rate(pps)
            }
            None => {
                for class in &mut self.classes[port as usize] {
                    class.set_rate(pps);
                }
            }
        }
        Ok(())
    }

    /// Reconfigure the admission limit of one class, or of every
    /// class at the port when `priority` is `None`. Shrinking below
    /// the current depth only blocks new admissions; queued items are
    /// not evicted.
    pub fn set_capacity(
        &mut self,
        port: u16,
        priority: Option<u8>,
        capacity: usize,
    ) -> Result<(), SwitchError> {
        self.check(port, priority)?;
        match priority {
            Some(prio) => {
                self.classes[port as usize][prio as usize].capacity = capacity
            }
            None => {
                for class in &mut self.classes[port as usize] {
                    class.capacity = capacity;
                }
            }
        }
        Ok(())
    }

    /// Snapshot every class, ports outermost.
    pub fn dump(&self) -> Vec<ClassSnap> {
        let mut snaps = Vec::with_capacity(
            self.ports as usize * self.priorities as usize,
        );
        for port in 0..self.ports {
            for prio in 0..self.priorities {
                let class = &self.classes[port as usize][prio as usize];
                snaps.push(ClassSnap {
                    port,
                    priority: prio,
                    depth: class.fifo.len(),
                    capacity: class.capacity,
                    rate_pps: class.rate_pps,
                });
            }
        }
        snaps
    }

    fn check(
        &self,
        port: u16,
        priority: Option<u8>,
    ) -> Result<(), SwitchError> {
        if port >= self.ports {
            return Err(SwitchError::BadPort { port, ports: self.ports });
        }

        if let Some(prio) = priority {
            if prio >= self.priorities {
                return Err(SwitchError::BadPriority {
                    priority: prio,
                    priorities: self.priorities,
                });
            }
        }

        Ok(())
    }

    /// The lowest-numbered priority at `port` whose head is eligible.
    fn ready_prio(&self, port: u16, now: SimTime) -> Option<u8> {
        for prio in 0..self.priorities {
            let class = &self.classes[port as usize][prio as usize];
            if let Some(head) = class.fifo.front() {
                if head.eligible <= now {
                    return Some(prio);
                }
            }
        }
        None
    }

    fn pop(&mut self, port: u16, prio: u8) -> Option<QueueItem> {
        self.classes[port as usize][prio as usize]
            .fifo
            .pop_front()
            .map(|paced| paced.item)
    }

    /// The `(port, priority)` the next dequeue will serve. Honors an
    /// existing mark; consumes rng state under the random policy but
    /// never advances the round-robin cursor (dequeue does that).
    fn find(&mut self, now: SimTime) -> Option<(u16, u8)> {
        if let Some(port) = self.marked {
            if let Some(prio) = self.ready_prio(port, now) {
                return Some((port, prio));
            }
            self.marked = None;
        }

        match self.policy {
            PortSelectPolicy::Random => {
                let mut untried: Vec<u16> = (0..self.ports).collect();
                while !untried.is_empty() {
                    let idx = self.rng.random_range(0..untried.len());
                    let port = untried.swap_remove(idx);
                    if let Some(prio) = self.ready_prio(port, now) {
                        return Some((port, prio));
                    }
                }
                None
            }
            PortSelectPolicy::RoundRobin => {
                for off in 0..self.ports {
                    let port = (self.rr_next + off) % self.ports;
                    if let Some(prio) = self.ready_prio(port, now) {
                        return Some((port, prio));
                    }
                }
                None
            }
        }
    }
}
