//! Transmit side of the host link.
//!
//! This module provides [`HostCommTx`], the state machine that drains the
//! transfer queue, frames each request, hands it to the [`ByteLink`] and, when
//! the request wants it, waits for the peer's acknowledgement.
//!
//! ## States
//!
//! - [`TxState::PollPendingTransfer`]: idle, no frame outstanding
//! - [`TxState::TransmitPacket`]: a frame was sent and awaits ack, nack or timeout
//!
//! ## Events
//!
//! - internal: [`InternalEvent::PendingPacket`], [`InternalEvent::NoAckExpected`]
//! - external: [`ExternalEvent::AckReceived`], [`ExternalEvent::NackReceived`], posted
//!   through a critical-section mailbox so an interrupt handler may raise them
//! - time: the `ack_timeout` [`TimeEvent`]
//!
//! Every [`run()`](HostCommTx::run) performs at most one transition and never blocks.
//! A nack or an ack timeout retransmits the same request until
//! [`TxConfig::max_retries`] retransmissions have been made; after that the
//! request is abandoned and the machine goes back to polling the queue.
//!
//! For the receive side, see [`crate::rx_fsm::HostCommRx`].

use core::fmt;

use crate::consts::{MAX_ACK_TIMEOUT_MS, MAX_NUM_OF_TRANSFER_RETRIES};
use crate::debug::format_debug_message;
use crate::error::Error;
use crate::frame::PacketType;
use crate::link::{write_frame, ByteLink};
use crate::mailbox::EventMailbox;
use crate::queue::{TxQueue, TxRequest};
use crate::timer::TimeEvent;

/// States of the transmit state machine.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TxState {
    /// Idle. The next queued request is sent as soon as one is pending.
    #[default]
    PollPendingTransfer,
    /// A frame is outstanding and waits for an acknowledgement or a timeout.
    TransmitPacket,
}

/// Events raised by the transmit machine itself.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum InternalEvent {
    /// The queue holds at least one request.
    PendingPacket,
    /// A request that needs no acknowledgement was just sent; poll the queue again.
    NoAckExpected,
}

/// Acknowledgement outcomes posted by the receive side.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ExternalEvent {
    /// The peer accepted the outstanding frame.
    AckReceived,
    /// The peer rejected the outstanding frame.
    NackReceived,
}

/// Timers owned by the transmit machine.
#[derive(Debug, Default)]
pub struct TxTimeEvents {
    /// Raised when an acknowledgement did not arrive in time.
    pub ack_timeout: TimeEvent,
}

/// The three event sources of the transmit machine.
#[derive(Debug, Default)]
pub struct TxEvents {
    /// Pending internal event, consumed by the next `run()`.
    pub internal: Option<InternalEvent>,
    /// Mailbox for acknowledgement events, writable from another context.
    pub external: EventMailbox<ExternalEvent>,
    /// Timers.
    pub time: TxTimeEvents,
}

/// Retry policy of the transmit machine.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct TxConfig {
    /// Retransmissions allowed per request before it is abandoned.
    pub max_retries: u8,
    /// Ticks to wait for an acknowledgement.
    pub ack_timeout_ms: u32,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_NUM_OF_TRANSFER_RETRIES,
            ack_timeout_ms: MAX_ACK_TIMEOUT_MS,
        }
    }
}

/// How a request left the transmit machine.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TransferOutcome {
    /// A request without acknowledgement was handed to the link.
    Sent {
        /// Type of the request.
        packet_type: PacketType,
    },
    /// The peer acknowledged the request.
    Delivered {
        /// Type of the request.
        packet_type: PacketType,
        /// Transmissions it took, first one included.
        attempts: u16,
    },
    /// The request was given up.
    Failed {
        /// Type of the request.
        packet_type: PacketType,
        /// [`Error::RetryBudgetExhausted`] or [`Error::LinkWrite`].
        error: Error,
    },
}

/// Running totals kept by the transmit machine.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub struct TxStats {
    /// Requests without acknowledgement handed to the link.
    pub sent: u16,
    /// Requests acknowledged by the peer.
    pub delivered: u16,
    /// Retransmissions caused by a nack or a timeout.
    pub retransmissions: u16,
    /// Requests given up after exhausting the retry budget or failing on the link.
    pub abandoned: u16,
    /// Requests rejected because the queue was full.
    pub dropped: u16,
}

/// The transmit state machine handle.
///
/// ## Example
///
/// ```rust
/// use hostcomm::frame::PacketType;
/// use hostcomm::tx_fsm::{ExternalEvent, HostCommTx, TransferOutcome, TxState};
/// # use hostcomm::link::ByteLink;
/// # struct Uart;
/// # impl ByteLink for Uart {
/// #     type Error = ();
/// #     fn write(&mut self, _bytes: &[u8]) -> Result<(), ()> { Ok(()) }
/// #     fn read(&mut self) -> nb::Result<u8, ()> { Err(nb::Error::WouldBlock) }
/// # }
///
/// let mut uart = Uart;
/// let mut tx = HostCommTx::default();
/// tx.enqueue_transfer(PacketType::Command(0x10), b"on", true).unwrap();
///
/// assert_eq!(tx.run(&mut uart), None);
/// assert_eq!(tx.state(), TxState::TransmitPacket);
///
/// // normally posted by the receive machine
/// assert!(tx.set_external_event(ExternalEvent::AckReceived));
/// assert_eq!(
///     tx.run(&mut uart),
///     Some(TransferOutcome::Delivered { packet_type: PacketType::Command(0x10), attempts: 1 })
/// );
/// ```
///
/// ## Notes
///
/// - Exactly one request is outstanding at a time.
/// - [`time_event_update()`](HostCommTx::time_event_update) must be called once per tick,
///   before `run()` in the same superloop iteration.
#[derive(Debug)]
pub struct HostCommTx {
    state: TxState,
    /// Event sources.
    pub events: TxEvents,
    retry_cnt: u8,
    request: Option<TxRequest>,
    queue: TxQueue,
    config: TxConfig,
    /// Running totals.
    pub stats: TxStats,
}

impl Default for HostCommTx {
    fn default() -> Self {
        Self::new(TxConfig::default())
    }
}

impl HostCommTx {
    /// Creates a transmit machine in [`TxState::PollPendingTransfer`] with an empty queue.
    pub fn new(config: TxConfig) -> Self {
        let mut tx = Self {
            state: TxState::PollPendingTransfer,
            events: TxEvents::default(),
            retry_cnt: 0,
            request: None,
            queue: TxQueue::new(),
            config,
            stats: TxStats::default(),
        };
        tx.init();
        tx
    }

    /// Resets the machine: back to polling, retry counter zeroed, timers disarmed.
    ///
    /// An outstanding request is dropped. Queued requests are kept.
    pub fn init(&mut self) {
        self.events.time.ack_timeout.stop();
        self.events.external.clear();
        self.enter_seq_poll_pending_transfer();
    }

    /// Current state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Retransmissions made so far for the outstanding request.
    pub fn retry_cnt(&self) -> u8 {
        self.retry_cnt
    }

    /// The request awaiting acknowledgement, if any.
    pub fn current_request(&self) -> Option<&TxRequest> {
        self.request.as_ref()
    }

    /// Number of requests waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Active retry policy.
    pub fn config(&self) -> TxConfig {
        self.config
    }

    /// Queues a transfer.
    ///
    /// # Errors
    /// - [`Error::PayloadTooLarge`] if `payload` does not fit a frame
    /// - [`Error::ReservedPacketType`] if a [`PacketType::Command`] carries a control code
    /// - [`Error::QueueFull`] if the queue is at capacity; the transfer is dropped
    pub fn enqueue_transfer(
        &mut self,
        packet_type: PacketType,
        payload: &[u8],
        ack_expected: bool,
    ) -> Result<(), Error> {
        let request = TxRequest::new(packet_type, payload, ack_expected)?;
        if let Err(e) = self.queue.enqueue(request) {
            self.stats.dropped = self.stats.dropped.wrapping_add(1);
            warn!("tx queue full, dropping {:?}", packet_type);
            return Err(e);
        }
        if self.state == TxState::PollPendingTransfer {
            self.events.internal = Some(InternalEvent::PendingPacket);
        }
        Ok(())
    }

    /// Queues a packet that carries no payload, such as an ack or a ping.
    ///
    /// # Errors
    /// [`Error::QueueFull`] if the queue is at capacity.
    pub fn send_packet_no_payload(
        &mut self,
        packet_type: PacketType,
        ack_expected: bool,
    ) -> Result<(), Error> {
        self.enqueue_transfer(packet_type, &[], ack_expected)
    }

    /// Queues `text` as a [`PacketType::DebugMessage`].
    ///
    /// # Errors
    /// - [`Error::DebugMessageTooLong`] if `text` exceeds [`DBG_MSG_BUFF_SIZE`](crate::consts::DBG_MSG_BUFF_SIZE)
    /// - [`Error::QueueFull`] if the queue is at capacity
    pub fn send_debug_message(&mut self, text: &str, ack_expected: bool) -> Result<(), Error> {
        let message = format_debug_message(format_args!("{text}"))?;
        self.enqueue_transfer(PacketType::DebugMessage, message.as_bytes(), ack_expected)
    }

    /// Formats and queues a debug message. See [`host_comm_printf!`](crate::host_comm_printf).
    ///
    /// # Errors
    /// Same as [`send_debug_message`](HostCommTx::send_debug_message).
    pub fn write_dbg_fmt(
        &mut self,
        args: fmt::Arguments<'_>,
        ack_expected: bool,
    ) -> Result<(), Error> {
        let message = format_debug_message(args)?;
        self.enqueue_transfer(PacketType::DebugMessage, message.as_bytes(), ack_expected)
    }

    /// Posts an acknowledgement outcome for the outstanding frame.
    ///
    /// Safe to call from interrupt context. Returns `false` if an earlier event
    /// has not been consumed yet, in which case `event` is dropped.
    pub fn set_external_event(&self, event: ExternalEvent) -> bool {
        let posted = self.events.external.post(event);
        if !posted {
            warn!("tx mailbox busy, dropping {:?}", event);
        }
        posted
    }

    /// Advances every timer owned by the machine by one tick.
    pub fn time_event_update(&mut self) {
        self.events.time.ack_timeout.update();
    }

    /// Performs at most one transition.
    ///
    /// # Returns
    /// The outcome of a request that was resolved by this call, if any.
    pub fn run<L: ByteLink>(&mut self, link: &mut L) -> Option<TransferOutcome> {
        match self.state {
            TxState::PollPendingTransfer => self.poll_pending_transfer_on_react(link),
            TxState::TransmitPacket => self.transmit_packet_on_react(link),
        }
    }

    fn poll_pending_transfer_on_react<L: ByteLink>(
        &mut self,
        link: &mut L,
    ) -> Option<TransferOutcome> {
        if let Some(stray) = self.events.external.take() {
            debug!("ignoring {:?} while idle", stray);
        }

        match self.events.internal.take()? {
            InternalEvent::PendingPacket => {
                let request = self.queue.dequeue()?;
                self.retry_cnt = 0;
                let written = Self::transmit(link, &request);
                if request.ack_expected {
                    self.request = Some(request);
                    self.enter_seq_transmit_packet();
                    return None;
                }

                self.events.internal = Some(InternalEvent::NoAckExpected);
                let packet_type = request.packet_type;
                if written {
                    self.stats.sent = self.stats.sent.wrapping_add(1);
                    Some(TransferOutcome::Sent { packet_type })
                } else {
                    self.stats.abandoned = self.stats.abandoned.wrapping_add(1);
                    Some(TransferOutcome::Failed {
                        packet_type,
                        error: Error::LinkWrite,
                    })
                }
            }
            InternalEvent::NoAckExpected => {
                self.enter_seq_poll_pending_transfer();
                None
            }
        }
    }

    fn transmit_packet_on_react<L: ByteLink>(&mut self, link: &mut L) -> Option<TransferOutcome> {
        if let Some(event) = self.events.external.take() {
            return match event {
                ExternalEvent::AckReceived => {
                    let outcome = self.request.as_ref().map(|request| {
                        TransferOutcome::Delivered {
                            packet_type: request.packet_type,
                            attempts: u16::from(self.retry_cnt) + 1,
                        }
                    });
                    debug!("tx delivered after {} retries", self.retry_cnt);
                    self.stats.delivered = self.stats.delivered.wrapping_add(1);
                    self.exit_action_transmit_packet();
                    self.enter_seq_poll_pending_transfer();
                    outcome
                }
                ExternalEvent::NackReceived => self.retry_or_abandon(link),
            };
        }

        if self.events.time.ack_timeout.is_raised() {
            warn!("ack timeout");
            return self.retry_or_abandon(link);
        }
        None
    }

    fn retry_or_abandon<L: ByteLink>(&mut self, link: &mut L) -> Option<TransferOutcome> {
        if self.retry_cnt < self.config.max_retries {
            self.retry_cnt += 1;
            self.stats.retransmissions = self.stats.retransmissions.wrapping_add(1);
            warn!("tx retry {} of {}", self.retry_cnt, self.config.max_retries);
            if let Some(request) = self.request.as_ref() {
                let _ = Self::transmit(link, request);
            }
            self.entry_action_transmit_packet();
            return None;
        }

        let attempts = u16::from(self.retry_cnt) + 1;
        let outcome = self.request.as_ref().map(|request| TransferOutcome::Failed {
            packet_type: request.packet_type,
            error: Error::RetryBudgetExhausted { attempts },
        });
        error!("tx abandoned after {} attempts", attempts);
        self.stats.abandoned = self.stats.abandoned.wrapping_add(1);
        self.exit_action_transmit_packet();
        self.enter_seq_poll_pending_transfer();
        outcome
    }

    /// Frames `request` and writes it to the link, sync byte first.
    fn transmit<L: ByteLink>(link: &mut L, request: &TxRequest) -> bool {
        match write_frame(link, request.packet_type, &request.payload) {
            Ok(()) => true,
            Err(e) => {
                warn!("cannot send {:?}: {:?}", request.packet_type, e);
                false
            }
        }
    }

    fn set_next_state(&mut self, state: TxState) {
        self.state = state;
        self.events.internal = None;
    }

    fn enter_seq_poll_pending_transfer(&mut self) {
        self.set_next_state(TxState::PollPendingTransfer);
        self.retry_cnt = 0;
        self.request = None;
        if !self.queue.is_empty() {
            self.events.internal = Some(InternalEvent::PendingPacket);
        }
    }

    fn enter_seq_transmit_packet(&mut self) {
        self.set_next_state(TxState::TransmitPacket);
        self.entry_action_transmit_packet();
    }

    fn entry_action_transmit_packet(&mut self) {
        self.events
            .time
            .ack_timeout
            .start(self.config.ack_timeout_ms);
    }

    fn exit_action_transmit_packet(&mut self) {
        self.events.time.ack_timeout.stop();
    }
}
