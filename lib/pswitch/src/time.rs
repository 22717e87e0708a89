// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Simulated time.

use core::ops::Add;
use core::time::Duration;

/// The number of milliseconds in a second.
pub const MILLIS: u64 = 1_000;
/// The number of microseconds in a second.
pub const MICROS: u64 = 1_000_000;
/// The number of nanoseconds in a second.
pub const NANOS: u64 = 1_000_000_000;

/// A moment in simulated time: nanoseconds since the start of the
/// simulation.
///
/// The engine never reads a host clock. The event scheduler owns
/// virtual time and passes the current moment into every operation
/// that needs one, so a run is a pure function of its inputs.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: Self = Self(0);

    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    pub const fn from_micros(us: u64) -> Self {
        Self(us * (NANOS / MICROS))
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * (NANOS / MILLIS))
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub const fn as_micros(self) -> u64 {
        self.0 / (NANOS / MICROS)
    }

    /// The time elapsed since `earlier`, in microseconds, saturating
    /// to zero if `earlier` is in the future.
    pub const fn delta_as_micros(self, earlier: SimTime) -> u64 {
        self.0.saturating_sub(earlier.0) / (NANOS / MICROS)
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, dur: Duration) -> SimTime {
        SimTime(self.0.saturating_add(dur.as_nanos() as u64))
    }
}
