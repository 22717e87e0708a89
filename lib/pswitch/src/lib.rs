// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! A programmable match-action switch pipeline for discrete-event
//! network simulation.
//!
//! The engine bridges a simulator's packet representation to an
//! external match-action engine's representation, drives packets
//! through one ingress and one egress pass (with the full set of
//! side-effect paths: drop, mirror/clone, resubmit, recirculate,
//! multicast replication), and schedules transmission through a
//! multi-port, multi-priority, rate-limited egress queue.
//!
//! Everything runs single-threaded and run-to-completion: the
//! embedding simulator's event scheduler invokes the handlers on
//! [`engine::pipeline::Pipeline`] and supplies the current simulated
//! time to each call. The engine never reads a clock and never
//! blocks.

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

pub mod api;
pub mod engine;
pub mod time;
