//! Error type shared by the codec, the transfer queue and the state machines.
//!
//! None of these errors is fatal. Each is handled by the component that
//! raises it: the receive machine drops (or nacks) bad frames, the transmit
//! machine reports abandoned requests, and callers of the enqueue functions
//! decide whether to retry a rejected transfer later.

use thiserror::Error;

/// Everything that can go wrong inside the host link.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Error {
    /// The CRC-32 trailer disagrees with the value recomputed over header and payload.
    #[error("checksum mismatch: trailer {received:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the frame trailer.
        received: u32,
        /// Checksum recomputed over the received header and payload.
        computed: u32,
    },

    /// The header declares a payload length that does not match the bytes received.
    #[error("length mismatch: header declares {declared} payload bytes, got {received}")]
    LengthMismatch {
        /// Payload length declared in the header.
        declared: usize,
        /// Payload bytes actually available.
        received: usize,
    },

    /// A payload exceeds the configured maximum.
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge {
        /// Offending payload length.
        len: usize,
        /// Largest accepted payload.
        max: usize,
    },

    /// An application command uses a type code reserved for a control packet.
    #[error("packet type code {code:#04x} is reserved")]
    ReservedPacketType {
        /// Offending type code.
        code: u8,
    },

    /// The transmit queue is at capacity; the request was not accepted.
    #[error("transfer queue is full")]
    QueueFull,

    /// A request was abandoned after exhausting its retry budget.
    #[error("transfer abandoned after {attempts} attempts")]
    RetryBudgetExhausted {
        /// Total number of transmissions made.
        attempts: u16,
    },

    /// The byte-level driver refused the frame.
    #[error("byte link rejected the frame")]
    LinkWrite,

    /// A formatted debug message did not fit its buffer.
    #[error("debug message does not fit in {max} bytes")]
    DebugMessageTooLong {
        /// Capacity of the debug message buffer.
        max: usize,
    },

    /// An LED brightness above [`LED_MAX_BRIGHTNESS`](crate::consts::LED_MAX_BRIGHTNESS).
    #[error("brightness {brightness} exceeds maximum {max}")]
    BrightnessOutOfRange {
        /// Requested brightness.
        brightness: u8,
        /// Highest accepted brightness.
        max: u8,
    },

    /// An LED animation whose on-time is longer than its period.
    #[error("time on {time_on_ms} ms is longer than the {period_ms} ms period")]
    InvalidDutyCycle {
        /// Requested on-time.
        time_on_ms: u16,
        /// Requested period.
        period_ms: u16,
    },
}
