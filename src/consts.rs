//! Constants used across the host link protocol implementation.
//!
//! This module defines the protocol-wide constants used for buffer sizing,
//! frame layout, retry policy and the timing of the tick driven state machines.
//!
//! ## Key Concepts
//!
//! - **Retry budget**: how many times one request is retransmitted before it is abandoned.
//! - **Frame layout**: fixed 3-byte header (`type`, `length`) and a 4-byte CRC-32 trailer.
//! - **Sync byte**: link delimiter written before every frame, outside the checksum.
//! - **Buffer Sizing**: every buffer is bounded at build time; nothing is heap allocated.
//!
//! All durations are expressed in ticks of the 1 ms tick source.

/// Maximum number of retransmissions of a single request.
///
/// A request that keeps being nacked or timing out is sent
/// `MAX_NUM_OF_TRANSFER_RETRIES + 1` times in total and then abandoned.
pub const MAX_NUM_OF_TRANSFER_RETRIES: u8 = 2;

/// Time (in milliseconds) to wait for an acknowledgement before retransmitting.
pub const MAX_ACK_TIMEOUT_MS: u32 = 50;

/// Capacity (in bytes) of a formatted debug message.
pub const DBG_MSG_BUFF_SIZE: usize = 200;

/// Maximum number of payload bytes carried by one frame.
pub const HOST_COMM_MAX_PAYLOAD_LEN: usize = 256;

/// Length (in bytes) of the frame header: one type byte and a little-endian `u16` length.
pub const HOST_COMM_HEADER_LEN: usize = 3;

/// Length (in bytes) of the CRC-32 trailer.
pub const HOST_COMM_CRC_LEN: usize = 4;

/// Maximum size (in bytes) of an encoded frame, excluding the sync byte.
pub const HOST_COMM_MAX_FRAME_LEN: usize =
    HOST_COMM_HEADER_LEN + HOST_COMM_MAX_PAYLOAD_LEN + HOST_COMM_CRC_LEN;

/// Maximum size (in bytes) of a frame as written to the link, sync byte included.
pub const HOST_COMM_MAX_WIRE_LEN: usize = HOST_COMM_MAX_FRAME_LEN + 1;

/// The delimiter written before every frame.
///
/// The receiver hunts for this byte to find the start of a frame.
/// It is not covered by the checksum.
pub const HOST_COMM_SYNC_BYTE: u8 = 0xaa;

/// Number of transfer requests the transmit queue can hold.
pub const HOST_COMM_TX_QUEUE_LEN: usize = 8;

/// Maximum silence (in milliseconds) between two bytes of the same frame.
///
/// A partially received frame is dropped when this expires.
pub const HOST_COMM_RX_BYTE_TIMEOUT_MS: u32 = 20;

/// Packet type of a positive acknowledgement.
pub const PACKET_TYPE_ACK: u8 = 0x06;

/// Packet type of a negative acknowledgement.
pub const PACKET_TYPE_NACK: u8 = 0x15;

/// Packet type of a debug text message.
pub const PACKET_TYPE_DEBUG_MESSAGE: u8 = 0x44;

/// Packet type of a liveness probe.
pub const PACKET_TYPE_PING: u8 = 0x50;

/// Execution time that makes an LED animation run until stopped.
pub const LED_ENDLESS_EXEC_TIME: u32 = u32::MAX;

/// Period (in milliseconds) of the software PWM used for LED brightness.
pub const LED_BRIGHT_REFRESH_RATE: u32 = 25;

/// Highest accepted LED brightness, one step per millisecond of the PWM period.
pub const LED_MAX_BRIGHTNESS: u8 = 25;
