//! # hostcomm
//!
//! A portable, no_std Rust transport for talking to a host over a byte-oriented serial link,
//! written for small microcontroller firmware driven by a cooperative superloop.
//!
//! This crate turns an unreliable byte stream into an acknowledged request/response channel:
//! - CRC-32 protected frames built by a piecewise checksum accumulator
//! - a bounded FIFO of pending transfers
//! - a transmit state machine with acknowledgement timeout and a fixed retry budget
//! - a receive state machine that reassembles frames and raises ack/nack events
//! - tick-driven one-shot timers, usable from a timer interrupt or a delay loop
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support |
//! | `delay-loop`          | Blocking superloop driven by `embedded_hal::delay::DelayNs` |
//! | `timer-isr` (default) | `critical_section` protected globals for interrupt driven ticks |
//! | `defmt-0-3`           | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Wire format
//!
//! ```text
//! [ 0xAA ][ type : u8 ][ length : u16 LE ][ payload ][ crc32 : u32 LE ]
//! ```
//!
//! The sync byte is a link delimiter only; the checksum covers `type || length || payload`.
//!
//! ## Usage
//!
//! ```rust
//! use hostcomm::superloop::HostComm;
//! use hostcomm::timer::{Clock, ManualClock};
//! # use hostcomm::link::ByteLink;
//! # struct Uart;
//! # impl ByteLink for Uart {
//! #     type Error = ();
//! #     fn write(&mut self, _bytes: &[u8]) -> Result<(), ()> { Ok(()) }
//! #     fn read(&mut self) -> nb::Result<u8, ()> { Err(nb::Error::WouldBlock) }
//! # }
//!
//! let clock = ManualClock::new(0);
//! let mut host = HostComm::new(Uart, Default::default(), Default::default(), clock.now_ms());
//! let _ = host.tx.send_debug_message("boot", false);
//! let mut on_packet = |_ty: hostcomm::frame::PacketType, _payload: &[u8]| {};
//! loop {
//!     let _ = host.poll(&clock, &mut on_packet);
//!     clock.advance(1);
//!     # break;
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - Timeouts are counted in ticks; the tick source is expected to run at 1 ms
//! - Only one transfer is outstanding at a time; there is no pipelining
//! - Acknowledgements may be posted from interrupt context through the mailbox
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

pub use critical_section;
pub use heapless;

#[macro_use]
mod fmt;

pub mod animation;
pub mod consts;
pub(crate) mod crc;
pub mod debug;
pub mod error;
pub mod frame;
pub mod link;
pub mod mailbox;
pub mod queue;
pub mod rx_fsm;
pub mod superloop;
pub mod timer;
pub mod tx_fsm;

pub use error::Error;
