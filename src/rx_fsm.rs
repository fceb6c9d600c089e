//! Receive side of the host link.
//!
//! [`HostCommRx`] reassembles frames from the bytes returned by a [`ByteLink`],
//! verifies them with the frame codec and routes the result:
//!
//! - Ack / Nack frames become [`ExternalEvent`]s posted into the transmit machine
//! - any other valid frame is handed to a [`PacketHandler`], and acknowledged if
//!   [`RxConfig::ack_inbound`] is set
//! - a bad frame is dropped, or answered with a Nack if the policy says so
//!
//! Acks and Nacks sent by this side are written to the link right away. They
//! never enter the transfer queue, so they cannot wait behind a request of the
//! transmit machine that is itself waiting for the peer's Ack.
//!
//! ## States
//!
//! - [`RxState::CheckPreamble`]: hunting for the sync byte, everything else is skipped
//! - [`RxState::ReadHeader`]: collecting the type and length bytes
//! - [`RxState::ReadBody`]: collecting payload and checksum
//!
//! A gap longer than [`RxConfig::byte_timeout_ms`] inside a frame drops the
//! partial frame and reports it as a [`Error::LengthMismatch`].

use heapless::Vec;

use crate::consts::{
    HOST_COMM_CRC_LEN, HOST_COMM_HEADER_LEN, HOST_COMM_MAX_FRAME_LEN, HOST_COMM_MAX_PAYLOAD_LEN,
    HOST_COMM_RX_BYTE_TIMEOUT_MS, HOST_COMM_SYNC_BYTE,
};
use crate::error::Error;
use crate::frame::{self, PacketType};
use crate::link::{write_frame, ByteLink};
use crate::timer::TimeEvent;
use crate::tx_fsm::{ExternalEvent, HostCommTx};

/// States of the receive state machine.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RxState {
    /// Waiting for [`HOST_COMM_SYNC_BYTE`].
    #[default]
    CheckPreamble,
    /// Reading the frame header.
    ReadHeader,
    /// Reading payload and checksum.
    ReadBody,
}

/// What to do with a frame that fails validation.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum RxErrorPolicy {
    /// Drop it silently; the sender's ack timeout triggers the retransmission.
    #[default]
    Discard,
    /// Drop it and answer with a Nack so the sender retransmits right away.
    Nack,
}

/// Behaviour of the receive state machine.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct RxConfig {
    /// Handling of corrupted or truncated frames.
    pub error_policy: RxErrorPolicy,
    /// Answer every valid inbound frame other than Ack and Nack with an Ack.
    pub ack_inbound: bool,
    /// Longest silence, in ticks, allowed between two bytes of a frame.
    pub byte_timeout_ms: u32,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            error_policy: RxErrorPolicy::Discard,
            ack_inbound: true,
            byte_timeout_ms: HOST_COMM_RX_BYTE_TIMEOUT_MS,
        }
    }
}

/// Application side consumer of inbound packets.
pub trait PacketHandler {
    /// Called once for every valid frame that is not an Ack or a Nack.
    fn on_packet(&mut self, packet_type: PacketType, payload: &[u8]);
}

impl<F> PacketHandler for F
where
    F: FnMut(PacketType, &[u8]),
{
    fn on_packet(&mut self, packet_type: PacketType, payload: &[u8]) {
        self(packet_type, payload)
    }
}

/// The receive state machine handle.
#[derive(Debug)]
pub struct HostCommRx {
    state: RxState,
    buf: Vec<u8, HOST_COMM_MAX_FRAME_LEN>,
    expected_len: usize,
    byte_timeout: TimeEvent,
    config: RxConfig,

    /// Counter of valid frames received.
    pub rx_good: u16,

    /// Counter of frames rejected for a bad checksum, a bad length or a timeout.
    pub rx_bad: u16,
}

impl Default for HostCommRx {
    fn default() -> Self {
        Self::new(RxConfig::default())
    }
}

impl HostCommRx {
    /// Creates a receive machine hunting for the next sync byte.
    pub fn new(config: RxConfig) -> Self {
        let mut rx = Self {
            state: RxState::CheckPreamble,
            buf: Vec::new(),
            expected_len: 0,
            byte_timeout: TimeEvent::new(),
            config,
            rx_good: 0,
            rx_bad: 0,
        };
        rx.init();
        rx
    }

    /// Drops any partial frame and starts hunting for a sync byte.
    pub fn init(&mut self) {
        self.enter_seq_check_preamble();
    }

    /// Current state.
    pub fn state(&self) -> RxState {
        self.state
    }

    /// Active configuration.
    pub fn config(&self) -> RxConfig {
        self.config
    }

    /// Advances every timer owned by the machine by one tick.
    pub fn time_event_update(&mut self) {
        self.byte_timeout.update();
    }

    /// Consumes the bytes available on `link`, at most one maximum size frame worth.
    ///
    /// Completed frames are routed as described in the [module docs](self).
    pub fn run<L, H>(&mut self, link: &mut L, tx: &HostCommTx, handler: &mut H)
    where
        L: ByteLink,
        H: PacketHandler,
    {
        if self.byte_timeout.is_raised() {
            let declared = self.expected_len.saturating_sub(HOST_COMM_HEADER_LEN + HOST_COMM_CRC_LEN);
            let received = self.buf.len().saturating_sub(HOST_COMM_HEADER_LEN);
            self.enter_seq_check_preamble();
            self.reject(link, Error::LengthMismatch { declared, received });
        }

        for _ in 0..=HOST_COMM_MAX_FRAME_LEN {
            let byte = match link.read() {
                Ok(byte) => byte,
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(_)) => {
                    warn!("link read failed");
                    break;
                }
            };
            if self.push_byte(byte, link) {
                self.dispatch(link, tx, handler);
                self.enter_seq_check_preamble();
            }
        }
    }

    /// Feeds one byte. Returns `true` when `buf` holds a complete frame.
    fn push_byte<L: ByteLink>(&mut self, byte: u8, link: &mut L) -> bool {
        match self.state {
            RxState::CheckPreamble => {
                if byte == HOST_COMM_SYNC_BYTE {
                    self.enter_seq_read_header();
                }
                false
            }
            RxState::ReadHeader => {
                self.restart_byte_timeout();
                if self.buf.push(byte).is_err() {
                    self.enter_seq_check_preamble();
                    return false;
                }
                if self.buf.len() < HOST_COMM_HEADER_LEN {
                    return false;
                }
                let declared = usize::from(u16::from_le_bytes([self.buf[1], self.buf[2]]));
                if declared > HOST_COMM_MAX_PAYLOAD_LEN {
                    self.enter_seq_check_preamble();
                    self.reject(
                        link,
                        Error::PayloadTooLarge {
                            len: declared,
                            max: HOST_COMM_MAX_PAYLOAD_LEN,
                        },
                    );
                    return false;
                }
                self.expected_len = HOST_COMM_HEADER_LEN + declared + HOST_COMM_CRC_LEN;
                self.set_next_state(RxState::ReadBody);
                false
            }
            RxState::ReadBody => {
                self.restart_byte_timeout();
                if self.buf.push(byte).is_err() {
                    self.enter_seq_check_preamble();
                    return false;
                }
                self.buf.len() >= self.expected_len
            }
        }
    }

    fn dispatch<L, H>(&mut self, link: &mut L, tx: &HostCommTx, handler: &mut H)
    where
        L: ByteLink,
        H: PacketHandler,
    {
        let packet = match frame::decode(&self.buf) {
            Ok(packet) => packet,
            Err(e) => {
                self.reject(link, e);
                return;
            }
        };
        self.rx_good = self.rx_good.wrapping_add(1);

        match packet.packet_type {
            PacketType::Ack => {
                let _ = tx.set_external_event(ExternalEvent::AckReceived);
            }
            PacketType::Nack => {
                let _ = tx.set_external_event(ExternalEvent::NackReceived);
            }
            packet_type => {
                debug!("rx {:?}, {} bytes", packet_type, packet.payload.len());
                handler.on_packet(packet_type, packet.payload);
                if self.config.ack_inbound {
                    send_control(link, PacketType::Ack);
                }
            }
        }
    }

    fn reject<L: ByteLink>(&mut self, link: &mut L, e: Error) {
        self.rx_bad = self.rx_bad.wrapping_add(1);
        warn!("rx frame rejected: {:?}", e);
        if self.config.error_policy == RxErrorPolicy::Nack {
            send_control(link, PacketType::Nack);
        }
    }

    fn set_next_state(&mut self, state: RxState) {
        self.state = state;
    }

    fn restart_byte_timeout(&mut self) {
        self.byte_timeout.start(self.config.byte_timeout_ms);
    }

    fn enter_seq_check_preamble(&mut self) {
        self.set_next_state(RxState::CheckPreamble);
        self.byte_timeout.stop();
        self.buf.clear();
        self.expected_len = 0;
    }

    fn enter_seq_read_header(&mut self) {
        self.set_next_state(RxState::ReadHeader);
        self.buf.clear();
        self.restart_byte_timeout();
    }
}

/// Writes an Ack or a Nack frame directly to the link.
fn send_control<L: ByteLink>(link: &mut L, packet_type: PacketType) {
    if let Err(e) = write_frame(link, packet_type, &[]) {
        warn!("cannot send {:?}: {:?}", packet_type, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::MockLink;
    use crate::tx_fsm::{TransferOutcome, TxState};
    use std::vec::Vec;

    #[derive(Default)]
    struct Inbox {
        packets: Vec<(PacketType, Vec<u8>)>,
    }

    impl PacketHandler for Inbox {
        fn on_packet(&mut self, packet_type: PacketType, payload: &[u8]) {
            self.packets.push((packet_type, payload.to_vec()));
        }
    }

    #[test]
    fn test_rx_initialization() {
        let rx = HostCommRx::default();
        assert_eq!(rx.state(), RxState::CheckPreamble);
        assert_eq!(rx.config(), RxConfig::default());
        assert_eq!(rx.rx_good, 0);
        assert_eq!(rx.rx_bad, 0);
    }

    #[test]
    fn test_command_is_dispatched_and_acknowledged() {
        let mut link = MockLink::new();
        let mut tx = HostCommTx::default();
        let mut rx = HostCommRx::default();
        let mut inbox = Inbox::default();

        link.inject(PacketType::Command(0x30), b"blink");
        rx.run(&mut link, &tx, &mut inbox);

        assert_eq!(inbox.packets, vec![(PacketType::Command(0x30), b"blink".to_vec())]);
        assert_eq!(rx.rx_good, 1);
        assert_eq!(rx.state(), RxState::CheckPreamble);

        assert_eq!(link.sent(), vec![(PacketType::Ack, vec![])]);
        assert_eq!(tx.pending(), 0);
        assert_eq!(tx.run(&mut link), None);
    }

    #[test]
    fn test_inbound_command_is_acked_while_own_request_awaits_ack() {
        let mut link = MockLink::new();
        let mut tx = HostCommTx::default();
        let mut rx = HostCommRx::default();
        let mut inbox = Inbox::default();

        tx.enqueue_transfer(PacketType::Command(0x41), b"mine", true)
            .unwrap();
        assert_eq!(tx.run(&mut link), None);
        assert_eq!(tx.state(), TxState::TransmitPacket);

        link.inject(PacketType::Command(0x42), b"theirs");
        rx.run(&mut link, &tx, &mut inbox);

        assert_eq!(
            link.sent(),
            vec![
                (PacketType::Command(0x41), b"mine".to_vec()),
                (PacketType::Ack, vec![]),
            ]
        );
        assert_eq!(inbox.packets, vec![(PacketType::Command(0x42), b"theirs".to_vec())]);
        assert_eq!(tx.state(), TxState::TransmitPacket);
        assert_eq!(tx.retry_cnt(), 0);
        assert_eq!(tx.current_request().unwrap().packet_type, PacketType::Command(0x41));
    }

    #[test]
    fn test_ack_and_nack_reach_the_transmit_machine() {
        let mut link = MockLink::new();
        let mut tx = HostCommTx::default();
        let mut rx = HostCommRx::default();
        let mut inbox = Inbox::default();

        tx.enqueue_transfer(PacketType::Command(0x40), b"x", true)
            .unwrap();
        let _ = tx.run(&mut link);
        assert_eq!(tx.state(), TxState::TransmitPacket);

        link.inject(PacketType::Nack, &[]);
        rx.run(&mut link, &tx, &mut inbox);
        assert_eq!(tx.run(&mut link), None);
        assert_eq!(tx.retry_cnt(), 1);

        link.inject(PacketType::Ack, &[]);
        rx.run(&mut link, &tx, &mut inbox);
        assert_eq!(
            tx.run(&mut link),
            Some(TransferOutcome::Delivered {
                packet_type: PacketType::Command(0x40),
                attempts: 2
            })
        );
        assert!(inbox.packets.is_empty());
        assert_eq!(rx.rx_good, 2);
    }

    #[test]
    fn test_garbage_before_sync_is_skipped() {
        let mut link = MockLink::new();
        let tx = HostCommTx::default();
        let mut rx = HostCommRx::default();
        let mut inbox = Inbox::default();

        link.incoming.extend([0x00, 0x13, 0x37]);
        link.inject(PacketType::Ping, &[]);
        link.inject(PacketType::Command(0x31), &[HOST_COMM_SYNC_BYTE, 1]);
        rx.run(&mut link, &tx, &mut inbox);

        assert_eq!(
            inbox.packets,
            vec![
                (PacketType::Ping, vec![]),
                (PacketType::Command(0x31), vec![HOST_COMM_SYNC_BYTE, 1]),
            ]
        );
        assert_eq!(rx.rx_bad, 0);
    }

    #[test]
    fn test_corrupted_frame_is_discarded() {
        let mut link = MockLink::new();
        let tx = HostCommTx::default();
        let mut rx = HostCommRx::default();
        let mut inbox = Inbox::default();

        link.inject(PacketType::Command(0x32), b"abc");
        let last = link.incoming.len() - 5;
        link.incoming[last] ^= 0x01;
        rx.run(&mut link, &tx, &mut inbox);

        assert!(inbox.packets.is_empty());
        assert_eq!(rx.rx_bad, 1);
        assert!(link.writes.is_empty());
    }

    #[test]
    fn test_corrupted_frame_is_nacked_when_configured() {
        let mut link = MockLink::new();
        let tx = HostCommTx::default();
        let mut rx = HostCommRx::new(RxConfig {
            error_policy: RxErrorPolicy::Nack,
            ..RxConfig::default()
        });
        let mut inbox = Inbox::default();

        link.inject(PacketType::Command(0x33), b"abc");
        let crc_byte = link.incoming.len() - 1;
        link.incoming[crc_byte] ^= 0x80;
        rx.run(&mut link, &tx, &mut inbox);

        assert_eq!(rx.rx_bad, 1);
        assert_eq!(link.sent(), vec![(PacketType::Nack, vec![])]);
        assert_eq!(tx.pending(), 0);
    }

    #[test]
    fn test_truncated_frame_times_out() {
        let mut link = MockLink::new();
        let tx = HostCommTx::default();
        let mut rx = HostCommRx::default();
        let mut inbox = Inbox::default();

        link.inject(PacketType::Command(0x34), b"hello");
        let full = link.incoming.len();
        link.incoming.truncate(full - 3);
        rx.run(&mut link, &tx, &mut inbox);
        assert_eq!(rx.state(), RxState::ReadBody);

        for _ in 0..HOST_COMM_RX_BYTE_TIMEOUT_MS {
            rx.time_event_update();
        }
        rx.run(&mut link, &tx, &mut inbox);
        assert_eq!(rx.state(), RxState::CheckPreamble);
        assert_eq!(rx.rx_bad, 1);

        link.inject(PacketType::Ping, &[]);
        rx.run(&mut link, &tx, &mut inbox);
        assert_eq!(inbox.packets, vec![(PacketType::Ping, vec![])]);
    }

    #[test]
    fn test_frame_split_across_runs_is_reassembled() {
        let mut link = MockLink::new();
        let tx = HostCommTx::default();
        let mut rx = HostCommRx::default();
        let mut inbox = Inbox::default();

        let mut staged = MockLink::new();
        staged.inject(PacketType::Command(0x35), b"split me");
        while let Some(byte) = staged.incoming.pop_front() {
            link.incoming.push_back(byte);
            rx.run(&mut link, &tx, &mut inbox);
            rx.time_event_update();
        }
        assert_eq!(
            inbox.packets,
            vec![(PacketType::Command(0x35), b"split me".to_vec())]
        );
    }

    #[test]
    fn test_oversized_length_resyncs() {
        let mut link = MockLink::new();
        let tx = HostCommTx::default();
        let mut rx = HostCommRx::default();
        let mut inbox = Inbox::default();

        link.incoming.extend([HOST_COMM_SYNC_BYTE, 0x31, 0xff, 0xff]);
        link.inject(PacketType::Ping, &[]);
        rx.run(&mut link, &tx, &mut inbox);

        assert_eq!(rx.rx_bad, 1);
        assert_eq!(inbox.packets, vec![(PacketType::Ping, vec![])]);
    }

    #[test]
    fn test_closure_handler() {
        let mut link = MockLink::new();
        let tx = HostCommTx::default();
        let mut rx = HostCommRx::new(RxConfig {
            ack_inbound: false,
            ..RxConfig::default()
        });
        let mut seen = 0usize;
        let mut handler = |_: PacketType, payload: &[u8]| seen += payload.len();

        link.inject(PacketType::DebugMessage, b"four");
        rx.run(&mut link, &tx, &mut handler);
        assert_eq!(seen, 4);
        assert!(link.writes.is_empty());
    }
}
