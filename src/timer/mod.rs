//! Tick timers and clock sources for the host link state machines.
//!
//! Every state machine owns its own one-shot [`TimeEvent`]s and advances them
//! once per tick through its `time_event_update()` method. The tick itself comes
//! from one of two places: an interrupt service routine using
//! `critical_section::with` (`timer-isr` feature), or a busy-loop delay timer
//! (`delay-loop` feature).
//!
//! Contains:
//! - [`TimeEvent`]: latched one-shot countdown timer
//! - [`Clock`], [`ManualClock`]: millisecond clock sources, synthetic time for tests
//! - [`TickTracker`]: converts clock readings into owed timer updates
//! - `compute_tick_reload` / `const_tick_reload`: reload values for a periodic tick timer
//! - `systick_tick`, `SysTickClock` and the global helpers (feature `timer-isr`)
//! - `run_host_comm_loop`: blocking superloop over `DelayNs` (feature `delay-loop`)
//!
//! Common prescalers for a 1 ms tick: (For use with `compute_tick_reload` and `const_tick_reload`)
//!
//! | F_CPU     | PRESCALER | Reload |
//! |-----------|-----------|--------|
//! | 16 MHz    |        64 |    250 |
//! | 16 MHz    |         8 |   2000 |
//! | 84 MHz    |         1 |  84000 |
//! | 100 MHz   |         1 | 100000 |

use core::cell::Cell;

use libm::round;

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg_attr(feature = "delay-loop", allow(unused_imports))]
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;

/// Duration of one tick, in milliseconds.
pub const TICK_PERIOD_MS: u32 = 1;

/// A one-shot countdown timer advanced by explicit ticks.
///
/// `start(n)` arms the timer; the `n`-th following call to [`update`](TimeEvent::update)
/// latches [`is_raised`](TimeEvent::is_raised) and disarms it. The latch stays set until the
/// next `start` or `stop`. A duration of zero latches on the very next update.
///
/// ```rust
/// use hostcomm::timer::TimeEvent;
///
/// let mut timeout = TimeEvent::new();
/// timeout.start(2);
/// timeout.update();
/// assert!(!timeout.is_raised());
/// timeout.update();
/// assert!(timeout.is_raised());
/// ```
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub struct TimeEvent {
    remaining: u32,
    armed: bool,
    raised: bool,
}

impl TimeEvent {
    /// Creates a disarmed timer.
    pub const fn new() -> Self {
        Self {
            remaining: 0,
            armed: false,
            raised: false,
        }
    }

    /// Arms the timer to raise after `duration` ticks, clearing any previous latch.
    pub fn start(&mut self, duration: u32) {
        self.remaining = duration;
        self.armed = true;
        self.raised = false;
    }

    /// Disarms the timer without raising it.
    pub fn stop(&mut self) {
        self.remaining = 0;
        self.armed = false;
        self.raised = false;
    }

    /// Advances the timer by one tick.
    pub fn update(&mut self) {
        if !self.armed {
            return;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.armed = false;
            self.raised = true;
        }
    }

    /// Whether the timer has expired since it was last started.
    pub fn is_raised(&self) -> bool {
        self.raised
    }

    /// Whether the timer is still counting down.
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

/// A monotonic millisecond clock. Wraps around at `u32::MAX`.
pub trait Clock {
    /// Milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> u32;
}

/// A clock that only moves when told to.
///
/// Used by the delay loop, which counts its own iterations, and by tests that
/// need deterministic time.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u32>,
}

impl ManualClock {
    /// Creates a clock reading `now` milliseconds.
    pub const fn new(now: u32) -> Self {
        Self { now: Cell::new(now) }
    }

    /// Moves the clock forward by `ms` milliseconds.
    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}

/// Tracks how many ticks have elapsed between two clock readings.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct TickTracker {
    last_ms: u32,
}

impl TickTracker {
    /// Starts tracking from the clock reading `now_ms`.
    pub const fn new(now_ms: u32) -> Self {
        Self { last_ms: now_ms }
    }

    /// Returns the number of whole ticks since the previous call and consumes them.
    ///
    /// Partial ticks are carried over to the next call.
    pub fn elapsed_ticks(&mut self, now_ms: u32) -> u32 {
        let ticks = now_ms.wrapping_sub(self.last_ms) / TICK_PERIOD_MS;
        self.last_ms = self.last_ms.wrapping_add(ticks * TICK_PERIOD_MS);
        ticks
    }
}

/// Computes the reload value of a periodic timer for the requested tick interval.
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 1, 8, 64)
/// - `tick_ms`: desired tick interval in milliseconds (normally [`TICK_PERIOD_MS`])
///
/// # Returns
/// - Timer counts per tick (rounds to nearest integer)
pub fn compute_tick_reload(f_cpu: u32, prescaler: u32, tick_ms: f32) -> u32 {
    let counts_per_second: f32 = f_cpu as f32 / prescaler as f32;
    let counts_per_tick: f32 = counts_per_second * (tick_ms / 1_000.0);
    round(counts_per_tick as f64) as u32
}

/// Compile-time reload value calculator for a whole-millisecond tick.
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 1, 8, 64)
/// - `tick_ms`: desired tick interval in milliseconds
///
/// # Returns
/// - Timer counts per tick (truncated)
pub const fn const_tick_reload(f_cpu: u32, prescaler: u32, tick_ms: u32) -> u32 {
    ((f_cpu as u64 / prescaler as u64) * tick_ms as u64 / 1_000) as u32
}
