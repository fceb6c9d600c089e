//! Frame codec for the host link.
//!
//! A frame is a fixed 3-byte header followed by the payload and a CRC-32 trailer:
//!
//! ```text
//! [ type : u8 ][ length : u16 LE ][ payload : length bytes ][ crc32 : u32 LE ]
//! ```
//!
//! The checksum is accumulated piece by piece over the header and the payload,
//! so the two never have to sit in one contiguous buffer.
//!
//! ## Functions
//!
//! - [`encode`]: builds a frame from a packet type and a payload
//! - [`decode`]: validates a received frame and borrows its payload
//!
//! Decoding never panics. Malformed input is reported as
//! [`Error::LengthMismatch`] or [`Error::ChecksumMismatch`] and the caller decides
//! whether to nack or discard it.

use heapless::Vec;

use crate::consts::{
    HOST_COMM_CRC_LEN, HOST_COMM_HEADER_LEN, HOST_COMM_MAX_FRAME_LEN, HOST_COMM_MAX_PAYLOAD_LEN,
    PACKET_TYPE_ACK, PACKET_TYPE_DEBUG_MESSAGE, PACKET_TYPE_NACK, PACKET_TYPE_PING,
};
use crate::crc::Crc32Accumulator;
use crate::error::Error;

/// An encoded frame, sync byte excluded.
pub type FrameBuf = Vec<u8, HOST_COMM_MAX_FRAME_LEN>;

/// The kind of packet carried by a frame.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PacketType {
    /// Positive acknowledgement of the last frame received by the peer.
    Ack,
    /// Negative acknowledgement; the peer wants the last frame again.
    Nack,
    /// Human readable debug text.
    DebugMessage,
    /// Liveness probe.
    Ping,
    /// Any other application command, by raw type code.
    ///
    /// The codes of the variants above are reserved; build commands with
    /// [`PacketType::command`] to have them rejected up front.
    Command(u8),
}

impl PacketType {
    /// Builds an application command.
    ///
    /// # Errors
    /// [`Error::ReservedPacketType`] if `code` belongs to a control packet.
    pub fn command(code: u8) -> Result<Self, Error> {
        match PacketType::from(code) {
            PacketType::Command(code) => Ok(PacketType::Command(code)),
            _ => Err(Error::ReservedPacketType { code }),
        }
    }

    /// Checks that the type decodes back to itself.
    pub(crate) fn validate(self) -> Result<Self, Error> {
        match self {
            PacketType::Command(code) => PacketType::command(code),
            other => Ok(other),
        }
    }
}

impl From<u8> for PacketType {
    fn from(code: u8) -> Self {
        match code {
            PACKET_TYPE_ACK => PacketType::Ack,
            PACKET_TYPE_NACK => PacketType::Nack,
            PACKET_TYPE_DEBUG_MESSAGE => PacketType::DebugMessage,
            PACKET_TYPE_PING => PacketType::Ping,
            other => PacketType::Command(other),
        }
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        match packet_type {
            PacketType::Ack => PACKET_TYPE_ACK,
            PacketType::Nack => PACKET_TYPE_NACK,
            PacketType::DebugMessage => PACKET_TYPE_DEBUG_MESSAGE,
            PacketType::Ping => PACKET_TYPE_PING,
            PacketType::Command(code) => code,
        }
    }
}

/// A successfully decoded frame, borrowing its payload from the receive buffer.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Packet<'a> {
    /// Type byte from the header.
    pub packet_type: PacketType,
    /// Payload bytes, exactly as many as the header declared.
    pub payload: &'a [u8],
}

fn header(packet_type: PacketType, len: u16) -> [u8; HOST_COMM_HEADER_LEN] {
    let [lo, hi] = len.to_le_bytes();
    [u8::from(packet_type), lo, hi]
}

/// Encodes a packet into a frame ready to be handed to the link.
///
/// # Errors
/// - [`Error::ReservedPacketType`] for a [`PacketType::Command`] using a control code
/// - [`Error::PayloadTooLarge`] if `payload` is longer than [`HOST_COMM_MAX_PAYLOAD_LEN`]
pub fn encode(packet_type: PacketType, payload: &[u8]) -> Result<FrameBuf, Error> {
    let packet_type = packet_type.validate()?;
    let too_large = Error::PayloadTooLarge {
        len: payload.len(),
        max: HOST_COMM_MAX_PAYLOAD_LEN,
    };
    if payload.len() > HOST_COMM_MAX_PAYLOAD_LEN {
        return Err(too_large);
    }
    let len = u16::try_from(payload.len()).map_err(|_| too_large)?;
    let header = header(packet_type, len);

    let mut crc = Crc32Accumulator::new();
    crc.update(&header);
    crc.update(payload);

    let mut frame = FrameBuf::new();
    frame.extend_from_slice(&header).map_err(|_| too_large)?;
    frame.extend_from_slice(payload).map_err(|_| too_large)?;
    frame
        .extend_from_slice(&crc.finalize().to_le_bytes())
        .map_err(|_| too_large)?;
    Ok(frame)
}

/// Validates a frame and returns its type and payload.
///
/// `bytes` must hold exactly one frame: header, payload and trailer.
///
/// # Errors
/// - [`Error::LengthMismatch`] if the declared length disagrees with the byte count
/// - [`Error::PayloadTooLarge`] if the declared length exceeds the configured maximum
/// - [`Error::ChecksumMismatch`] if the trailer disagrees with the recomputed checksum
pub fn decode(bytes: &[u8]) -> Result<Packet<'_>, Error> {
    let overhead = HOST_COMM_HEADER_LEN + HOST_COMM_CRC_LEN;
    let declared = match bytes {
        [_, lo, hi, ..] => usize::from(u16::from_le_bytes([*lo, *hi])),
        _ => 0,
    };
    let received = bytes.len().saturating_sub(overhead);
    if bytes.len() < overhead || declared != received {
        return Err(Error::LengthMismatch { declared, received });
    }
    if declared > HOST_COMM_MAX_PAYLOAD_LEN {
        return Err(Error::PayloadTooLarge {
            len: declared,
            max: HOST_COMM_MAX_PAYLOAD_LEN,
        });
    }

    let (header, rest) = bytes.split_at(HOST_COMM_HEADER_LEN);
    let (payload, trailer) = rest.split_at(declared);

    let mut crc = Crc32Accumulator::new();
    crc.update(header);
    crc.update(payload);
    let computed = crc.finalize();

    let received_crc = match trailer {
        [b0, b1, b2, b3] => u32::from_le_bytes([*b0, *b1, *b2, *b3]),
        _ => {
            return Err(Error::LengthMismatch { declared, received });
        }
    };
    if received_crc != computed {
        return Err(Error::ChecksumMismatch {
            received: received_crc,
            computed,
        });
    }

    Ok(Packet {
        packet_type: PacketType::from(header[0]),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = encode(PacketType::DebugMessage, b"Hi").unwrap();
        assert_eq!(frame.len(), HOST_COMM_HEADER_LEN + 2 + HOST_COMM_CRC_LEN);
        assert_eq!(&frame[..5], &[PACKET_TYPE_DEBUG_MESSAGE, 2, 0, b'H', b'i']);

        let mut crc = Crc32Accumulator::new();
        crc.update(&frame[..5]);
        assert_eq!(&frame[5..], &crc.finalize().to_le_bytes());
    }

    #[test]
    fn test_round_trip_every_type_code() {
        let payload = [0xaa, 0x00, 0x55, 0xff];
        for code in 0..=u8::MAX {
            let packet_type = PacketType::from(code);
            let frame = encode(packet_type, &payload).unwrap();
            let packet = decode(&frame).unwrap();
            assert_eq!(packet.packet_type, packet_type);
            assert_eq!(u8::from(packet.packet_type), code);
            assert_eq!(packet.payload, &payload);
        }
    }

    #[test]
    fn test_commands_cannot_use_control_codes() {
        for code in [
            PACKET_TYPE_ACK,
            PACKET_TYPE_NACK,
            PACKET_TYPE_DEBUG_MESSAGE,
            PACKET_TYPE_PING,
        ] {
            assert_eq!(
                PacketType::command(code),
                Err(Error::ReservedPacketType { code })
            );
            assert_eq!(
                encode(PacketType::Command(code), b"p"),
                Err(Error::ReservedPacketType { code })
            );
        }
        assert_eq!(PacketType::command(0x31), Ok(PacketType::Command(0x31)));

        let frame = encode(PacketType::command(0x07).unwrap(), b"p").unwrap();
        assert_eq!(decode(&frame).unwrap().packet_type, PacketType::Command(0x07));
    }

    #[test]
    fn test_round_trip_empty_and_maximum_payload() {
        let frame = encode(PacketType::Ping, &[]).unwrap();
        let packet = decode(&frame).unwrap();
        assert_eq!(packet.packet_type, PacketType::Ping);
        assert!(packet.payload.is_empty());

        let big = [0x5a; HOST_COMM_MAX_PAYLOAD_LEN];
        let frame = encode(PacketType::Command(0x31), &big).unwrap();
        assert_eq!(frame.len(), HOST_COMM_MAX_FRAME_LEN);
        assert_eq!(decode(&frame).unwrap().payload, &big[..]);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let big = [0u8; HOST_COMM_MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            encode(PacketType::Command(1), &big),
            Err(Error::PayloadTooLarge {
                len: HOST_COMM_MAX_PAYLOAD_LEN + 1,
                max: HOST_COMM_MAX_PAYLOAD_LEN
            })
        );
    }

    #[test]
    fn test_single_bit_flip_never_accepted() {
        let frame = encode(PacketType::Command(0x42), b"set led 3").unwrap();
        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[byte] ^= 1 << bit;
                match decode(&corrupted) {
                    Err(Error::ChecksumMismatch { .. }) | Err(Error::LengthMismatch { .. }) => {}
                    other => panic!("byte {byte} bit {bit} decoded as {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_truncated_frame_is_length_mismatch() {
        let frame = encode(PacketType::Ping, b"abc").unwrap();
        assert_eq!(
            decode(&frame[..frame.len() - 1]),
            Err(Error::LengthMismatch {
                declared: 3,
                received: 2
            })
        );
        assert_eq!(
            decode(&frame[..2]),
            Err(Error::LengthMismatch {
                declared: 0,
                received: 0
            })
        );
        assert!(matches!(decode(&[]), Err(Error::LengthMismatch { .. })));
    }

    #[test]
    fn test_trailer_mismatch_reports_both_values() {
        let mut frame = encode(PacketType::Ack, &[]).unwrap();
        let good = u32::from_le_bytes([frame[3], frame[4], frame[5], frame[6]]);
        frame[6] ^= 0x80;
        assert_eq!(
            decode(&frame),
            Err(Error::ChecksumMismatch {
                received: good ^ 0x8000_0000,
                computed: good
            })
        );
    }
}
