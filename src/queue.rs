//! Bounded FIFO of outbound transfer requests.
//!
//! Application code enqueues, the transmit state machine is the only consumer.
//! There is no reordering, no priority and no duplicate suppression: every
//! enqueue is a distinct transfer. A full queue rejects the new request and
//! leaves the queued ones untouched.

use heapless::{Deque, Vec};

use crate::consts::{HOST_COMM_MAX_PAYLOAD_LEN, HOST_COMM_TX_QUEUE_LEN};
use crate::error::Error;
use crate::frame::PacketType;

/// One outbound transfer, owned by the queue until the transmit machine dequeues it.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct TxRequest {
    /// Packet type written in the frame header.
    pub packet_type: PacketType,
    /// Bytes to send.
    pub payload: Vec<u8, HOST_COMM_MAX_PAYLOAD_LEN>,
    /// Whether the peer must acknowledge the frame.
    pub ack_expected: bool,
}

impl TxRequest {
    /// Builds a request, copying `payload`.
    ///
    /// # Errors
    /// - [`Error::ReservedPacketType`] for a command using a control packet code
    /// - [`Error::PayloadTooLarge`] if `payload` exceeds [`HOST_COMM_MAX_PAYLOAD_LEN`]
    pub fn new(packet_type: PacketType, payload: &[u8], ack_expected: bool) -> Result<Self, Error> {
        let packet_type = packet_type.validate()?;
        let payload = Vec::from_slice(payload).map_err(|_| Error::PayloadTooLarge {
            len: payload.len(),
            max: HOST_COMM_MAX_PAYLOAD_LEN,
        })?;
        Ok(Self {
            packet_type,
            payload,
            ack_expected,
        })
    }
}

/// Fixed-capacity transfer queue.
#[derive(Debug)]
pub struct TxQueue<const N: usize = HOST_COMM_TX_QUEUE_LEN> {
    entries: Deque<TxRequest, N>,
}

impl<const N: usize> TxQueue<N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            entries: Deque::new(),
        }
    }

    /// Appends `request` at the tail.
    ///
    /// # Errors
    /// [`Error::QueueFull`] if the queue is at capacity. The request is dropped.
    pub fn enqueue(&mut self, request: TxRequest) -> Result<(), Error> {
        self.entries.push_back(request).map_err(|_| Error::QueueFull)
    }

    /// Removes and returns the oldest request.
    pub fn dequeue(&mut self) -> Option<TxRequest> {
        self.entries.pop_front()
    }

    /// Whether no request is waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the next enqueue would be rejected.
    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }

    /// Number of waiting requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Maximum number of waiting requests.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for TxQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
