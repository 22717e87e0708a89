// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Types shared between the pswitch engine and its clients: the
//! embedding simulator's device layer on one side and control-plane
//! code (mirror sessions, queue tuning) on the other.

#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub mod config;
pub mod meta;
pub mod stats;

pub use config::*;
pub use meta::*;
pub use stats::*;

/// The overall version of the API. Anytime an API type is added,
/// removed, or modified, this number should increment, so that a
/// control plane built against one version can detect a mismatched
/// engine.
pub const API_VERSION: u64 = 3;

/// The two halves of pipeline processing a packet passes through.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Direction {
    Ingress = 1,
    Egress = 2,
}

impl core::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ingress" => Ok(Direction::Ingress),
            "egress" => Ok(Direction::Egress),
            _ => Err(format!("invalid direction: {}", s)),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dirstr = match self {
            Direction::Ingress => "ingress",
            Direction::Egress => "egress",
        };

        write!(f, "{}", dirstr)
    }
}

/// Errors surfaced to the control plane or the embedding simulator.
///
/// Per-packet events (admission drops, policy drops, relay misses)
/// are not errors; they are counted in [`stats::PipelineStats`] and
/// end only that packet's pass.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SwitchError {
    #[error("bad configuration: {0}")]
    BadConfig(String),

    #[error("operation not valid in state {0}")]
    BadState(String),

    #[error("mirror session id {id} out of range (max {max})")]
    BadMirrorId { id: u16, max: u16 },

    #[error("mirror session {0} does not exist")]
    MirrorNotFound(u16),

    #[error("port {port} out of range (ports {ports})")]
    BadPort { port: u16, ports: u16 },

    #[error("priority {priority} out of range (priorities {priorities})")]
    BadPriority { priority: u8, priorities: u8 },
}
