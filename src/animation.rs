//! Status LED animation engine.
//!
//! [`LedAnimationFsm`] blinks one GPIO with a configurable period, on-time,
//! brightness and total duration. It is driven the same way as the transport
//! state machines: call [`time_update()`](LedAnimationFsm::time_update) once per
//! tick and [`run()`](LedAnimationFsm::run) once per superloop iteration.
//!
//! Brightness is a software PWM with a [`LED_BRIGHT_REFRESH_RATE`] ms period:
//! a brightness of `n` keeps the pin high for `n` ms out of every refresh period,
//! and only while the blink pattern is in its on phase.
//!
//! ```text
//! pattern  ____|‾‾‾‾‾‾‾‾‾|________|‾‾‾‾‾‾‾‾‾|____
//!              |--- period -------|
//!              |-time_on-|
//! pwm          ____|‾|__|‾|__|‾|________|‾|__|‾|__
//! ```

use embedded_hal::digital::OutputPin;

use crate::consts::{LED_BRIGHT_REFRESH_RATE, LED_ENDLESS_EXEC_TIME, LED_MAX_BRIGHTNESS};
use crate::error::Error;
use crate::timer::TimeEvent;

/// One blink pattern.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub struct LedAnimation {
    /// PWM on-time per refresh period, `0..=LED_MAX_BRIGHTNESS`.
    pub brightness: u8,
    /// Blink period in ms.
    pub period_ms: u16,
    /// On phase of each period in ms, at most `period_ms`.
    pub time_on_ms: u16,
    /// Total run time in ms, or [`LED_ENDLESS_EXEC_TIME`] to repeat until stopped.
    pub execution_time_ms: u32,
}

/// States of the animation engine.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum LedAnimationState {
    /// LED off, waiting for a start request.
    #[default]
    Idle,
    /// Pattern running.
    Exec,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum LedAnimationEvent {
    Start,
    Stop,
}

/// Timers owned by the animation engine.
#[derive(Debug, Default)]
pub struct LedAnimationTimeEvents {
    /// End of the whole animation.
    pub exec_time_expired: TimeEvent,
    /// End of the on phase of the current period.
    pub time_on_expired: TimeEvent,
    /// End of the current period.
    pub period_expired: TimeEvent,
    /// End of the PWM on-time.
    pub bright_amount: TimeEvent,
    /// End of the PWM period.
    pub bright_refresh: TimeEvent,
}

impl LedAnimationTimeEvents {
    fn update(&mut self) {
        self.exec_time_expired.update();
        self.time_on_expired.update();
        self.period_expired.update();
        self.bright_amount.update();
        self.bright_refresh.update();
    }

    fn stop(&mut self) {
        self.exec_time_expired.stop();
        self.time_on_expired.stop();
        self.period_expired.stop();
        self.bright_amount.stop();
        self.bright_refresh.stop();
    }
}

/// The animation state machine, owning its output pin.
///
/// ## Example
///
/// ```rust
/// use hostcomm::animation::{LedAnimation, LedAnimationFsm};
/// # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
/// # let led = Pin::new(&[PinTransaction::set(PinState::Low), PinTransaction::set(PinState::High)]);
///
/// let mut fsm = LedAnimationFsm::new(led);
/// fsm.start(LedAnimation {
///     brightness: 25,
///     period_ms: 500,
///     time_on_ms: 100,
///     execution_time_ms: 5_000,
/// })
/// .unwrap();
/// fsm.run();
/// assert!(fsm.is_ongoing());
/// # fsm.release().done();
/// ```
#[derive(Debug)]
pub struct LedAnimationFsm<P: OutputPin> {
    state: LedAnimationState,
    event: Option<LedAnimationEvent>,
    /// Timers.
    pub time: LedAnimationTimeEvents,
    animation: LedAnimation,
    pin: P,
    led_on: bool,
}

impl<P: OutputPin> LedAnimationFsm<P> {
    /// Takes ownership of `pin` and drives it low.
    pub fn new(pin: P) -> Self {
        let mut fsm = Self {
            state: LedAnimationState::Idle,
            event: None,
            time: LedAnimationTimeEvents::default(),
            animation: LedAnimation::default(),
            pin,
            led_on: false,
        };
        fsm.enter_seq_idle();
        fsm
    }

    /// Current state.
    pub fn state(&self) -> LedAnimationState {
        self.state
    }

    /// The pattern last accepted by [`start`](Self::start).
    pub fn animation(&self) -> LedAnimation {
        self.animation
    }

    /// Whether the pin is currently driven high.
    pub fn is_led_on(&self) -> bool {
        self.led_on
    }

    /// Whether a pattern is running.
    pub fn is_ongoing(&self) -> bool {
        self.state == LedAnimationState::Exec
    }

    /// Requests `animation`. Takes effect on the next [`run`](Self::run) and
    /// replaces a running pattern.
    ///
    /// # Errors
    /// - [`Error::BrightnessOutOfRange`] if `brightness > LED_MAX_BRIGHTNESS`
    /// - [`Error::InvalidDutyCycle`] if `time_on_ms > period_ms`
    pub fn start(&mut self, animation: LedAnimation) -> Result<(), Error> {
        if animation.time_on_ms > animation.period_ms {
            return Err(Error::InvalidDutyCycle {
                time_on_ms: animation.time_on_ms,
                period_ms: animation.period_ms,
            });
        }
        self.set_brightness(animation.brightness)?;
        self.animation = animation;
        self.event = Some(LedAnimationEvent::Start);
        Ok(())
    }

    /// Changes the brightness of the current pattern from the next PWM period on.
    ///
    /// # Errors
    /// [`Error::BrightnessOutOfRange`] if `brightness > LED_MAX_BRIGHTNESS`.
    pub fn set_brightness(&mut self, brightness: u8) -> Result<(), Error> {
        if brightness > LED_MAX_BRIGHTNESS {
            return Err(Error::BrightnessOutOfRange {
                brightness,
                max: LED_MAX_BRIGHTNESS,
            });
        }
        self.animation.brightness = brightness;
        Ok(())
    }

    /// Requests the LED off. Takes effect on the next [`run`](Self::run).
    pub fn stop(&mut self) {
        self.event = Some(LedAnimationEvent::Stop);
    }

    /// Advances every timer by one tick.
    pub fn time_update(&mut self) {
        self.time.update();
    }

    /// Performs at most one transition, otherwise refreshes the pin.
    pub fn run(&mut self) {
        match self.state {
            LedAnimationState::Idle => self.idle_on_react(),
            LedAnimationState::Exec => self.exec_on_react(),
        }
    }

    /// Gives the pin back.
    pub fn release(self) -> P {
        self.pin
    }

    fn idle_on_react(&mut self) {
        match self.event.take() {
            Some(LedAnimationEvent::Start) => self.enter_seq_exec(),
            Some(LedAnimationEvent::Stop) | None => {}
        }
    }

    fn exec_on_react(&mut self) {
        match self.event.take() {
            Some(LedAnimationEvent::Start) => {
                self.exit_action_exec();
                self.enter_seq_exec();
            }
            Some(LedAnimationEvent::Stop) => {
                self.exit_action_exec();
                self.enter_seq_idle();
            }
            None if self.time.exec_time_expired.is_raised() => {
                self.exit_action_exec();
                if self.animation.execution_time_ms == LED_ENDLESS_EXEC_TIME {
                    self.enter_seq_exec();
                } else {
                    debug!("led animation done");
                    self.enter_seq_idle();
                }
            }
            None => self.during_action_exec(),
        }
    }

    fn during_action_exec(&mut self) {
        if self.time.period_expired.is_raised() {
            self.time
                .time_on_expired
                .start(u32::from(self.animation.time_on_ms));
            self.time
                .period_expired
                .start(u32::from(self.animation.period_ms));
        }
        if self.time.bright_refresh.is_raised() {
            self.start_pwm_period();
        }
        let level = self.pattern_level();
        if level != self.led_on {
            self.drive(level);
        }
    }

    fn pattern_level(&self) -> bool {
        let on_phase = self.animation.time_on_ms > 0 && !self.time.time_on_expired.is_raised();
        let pwm_on = self.animation.brightness > 0 && !self.time.bright_amount.is_raised();
        on_phase && pwm_on
    }

    fn start_pwm_period(&mut self) {
        self.time.bright_refresh.start(LED_BRIGHT_REFRESH_RATE);
        self.time
            .bright_amount
            .start(u32::from(self.animation.brightness));
    }

    fn drive(&mut self, high: bool) {
        let written = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if written.is_err() {
            warn!("led pin write failed");
        }
        self.led_on = high;
    }

    fn set_next_state(&mut self, state: LedAnimationState) {
        self.state = state;
        self.event = None;
    }

    fn enter_seq_idle(&mut self) {
        self.set_next_state(LedAnimationState::Idle);
        self.drive(false);
    }

    fn enter_seq_exec(&mut self) {
        self.set_next_state(LedAnimationState::Exec);
        self.entry_action_exec();
    }

    fn entry_action_exec(&mut self) {
        self.time
            .exec_time_expired
            .start(self.animation.execution_time_ms);
        self.time
            .period_expired
            .start(u32::from(self.animation.period_ms));
        self.time
            .time_on_expired
            .start(u32::from(self.animation.time_on_ms));
        self.start_pwm_period();
        let level = self.pattern_level();
        self.drive(level);
    }

    fn exit_action_exec(&mut self) {
        self.time.stop();
    }
}
