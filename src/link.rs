//! Byte-level link abstraction.
//!
//! The transport never touches a UART directly. It talks to a [`ByteLink`],
//! which the board support code implements on top of its serial driver
//! (a DMA ring, an interrupt fed FIFO, or a plain register poll).
//!
//! Both primitives must be non-blocking:
//! - [`ByteLink::write`] hands over one complete wire frame, or fails
//! - [`ByteLink::read`] returns the next received byte, or `nb::Error::WouldBlock`

use core::fmt::Debug;

use heapless::Vec;

use crate::consts::{HOST_COMM_MAX_PAYLOAD_LEN, HOST_COMM_MAX_WIRE_LEN, HOST_COMM_SYNC_BYTE};
use crate::error::Error;
use crate::frame::{self, PacketType};

/// A non-blocking byte transport.
pub trait ByteLink {
    /// Driver specific failure.
    type Error: Debug;

    /// Queues `bytes` for transmission without waiting for them to leave the wire.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Returns the next received byte.
    ///
    /// `Err(nb::Error::WouldBlock)` means nothing is pending right now.
    fn read(&mut self) -> nb::Result<u8, Self::Error>;
}

impl<L: ByteLink + ?Sized> ByteLink for &mut L {
    type Error = L::Error;

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        (**self).write(bytes)
    }

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        (**self).read()
    }
}

/// Frames a packet and hands it to `link` in one write, sync byte first.
///
/// # Errors
/// - the encoding errors of [`frame::encode`]
/// - [`Error::LinkWrite`] if the link refuses the bytes
pub fn write_frame<L: ByteLink + ?Sized>(
    link: &mut L,
    packet_type: PacketType,
    payload: &[u8],
) -> Result<(), Error> {
    let too_large = Error::PayloadTooLarge {
        len: payload.len(),
        max: HOST_COMM_MAX_PAYLOAD_LEN,
    };
    let frame = frame::encode(packet_type, payload)?;
    let mut wire: Vec<u8, HOST_COMM_MAX_WIRE_LEN> = Vec::new();
    wire.push(HOST_COMM_SYNC_BYTE).map_err(|_| too_large)?;
    wire.extend_from_slice(&frame).map_err(|_| too_large)?;
    link.write(&wire).map_err(|_| Error::LinkWrite)
}
