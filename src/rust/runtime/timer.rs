// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Millisecond time base used to compute and compare task wake times.
//!
//! Timestamps are 32-bit and wrap around after roughly 49 days. All comparisons are done on the signed distance
//! between two timestamps, so they stay correct across the wraparound as long as the two timestamps are less than
//! `i32::MAX` milliseconds apart. Durations are clamped to that bound.

//==============================================================================
// Imports
//==============================================================================

use ::std::{
    cmp::Ordering,
    fmt,
    sync::{
        atomic::{
            self,
            AtomicU32,
        },
        Arc,
    },
    time::{
        Duration,
        Instant,
    },
};

//==============================================================================
// Constants
//==============================================================================

/// Longest duration that keeps wraparound-safe comparisons valid.
const MAX_SPAN_MILLIS: u32 = i32::MAX as u32;

//==============================================================================
// Structures
//==============================================================================

/// Point in time, in milliseconds, on a wrapping 32-bit clock.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Millis(pub u32);

/// Wall clock measuring milliseconds elapsed since its creation.
pub struct SystemClock {
    epoch: Instant,
}

/// Clock that only moves when told to. Hosts with a fixed simulation step and tests drive their tasks with it.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU32,
}

/// Clock handle shared between a scheduler and the tasks it owns.
pub type SharedClock = Arc<dyn Clock>;

//======================================================================================================================
// Traits
//======================================================================================================================

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Millis;
}

//==============================================================================
// Associate Functions
//==============================================================================

impl Millis {
    /// Returns the time `duration` after `self`.
    pub fn after(self, duration: Duration) -> Millis {
        let span: u32 = u32::try_from(duration.as_millis())
            .unwrap_or(MAX_SPAN_MILLIS)
            .min(MAX_SPAN_MILLIS);
        Millis(self.0.wrapping_add(span))
    }

    /// Signed distance, in milliseconds, from `now` to `self`. Negative when `self` is in the past.
    pub fn distance_from(self, now: Millis) -> i32 {
        self.0.wrapping_sub(now.0) as i32
    }

    /// Checks whether `self` has been reached at time `now`.
    pub fn is_reached_at(self, now: Millis) -> bool {
        self.distance_from(now) <= 0
    }

    /// Orders two timestamps relative to `now`.
    pub fn cmp_at(self, other: Millis, now: Millis) -> Ordering {
        self.distance_from(now).cmp(&other.distance_from(now))
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }

    /// Creates a shareable system clock.
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl ManualClock {
    pub fn new(now: Millis) -> Self {
        Self {
            now: AtomicU32::new(now.0),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: Millis) {
        self.now.store(now.0, atomic::Ordering::Release);
    }

    /// Moves the clock forward by `duration`.
    pub fn advance_clock(&self, duration: Duration) -> Millis {
        let now: Millis = self.now().after(duration);
        self.set(now);
        now
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Clock for SystemClock {
    fn now(&self) -> Millis {
        // Truncation is the wraparound.
        Millis(self.epoch.elapsed().as_millis() as u32)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        Millis(self.now.load(atomic::Ordering::Acquire))
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u32> for Millis {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Millis> for u32 {
    fn from(value: Millis) -> Self {
        value.0
    }
}

impl fmt::Debug for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
