//! Superloop glue.
//!
//! [`HostComm`] owns the link and both state machines and runs them in a fixed
//! order on every [`poll()`](HostComm::poll):
//!
//! 1. one timer pass per tick elapsed since the previous poll
//! 2. the transmit machine
//! 3. the receive machine
//!
//! An acknowledgement decoded by the receive machine is therefore seen by the
//! transmit machine on the next poll, after that poll's timer pass. Acks owed
//! to the peer are written by the receive machine during the same poll.

use crate::link::ByteLink;
use crate::rx_fsm::{HostCommRx, PacketHandler, RxConfig};
use crate::timer::{Clock, TickTracker};
use crate::tx_fsm::{HostCommTx, TransferOutcome, TxConfig};

/// Link plus both state machines.
#[derive(Debug)]
pub struct HostComm<L: ByteLink> {
    /// The byte link. Exposed so board code can service the underlying peripheral.
    pub link: L,
    /// Transmit state machine.
    pub tx: HostCommTx,
    /// Receive state machine.
    pub rx: HostCommRx,
    ticks: TickTracker,
}

impl<L: ByteLink> HostComm<L> {
    /// Creates the transport. `now_ms` is the current reading of the clock later passed to `poll`.
    pub fn new(link: L, tx_config: TxConfig, rx_config: RxConfig, now_ms: u32) -> Self {
        info!(
            "host comm up: {} retries, {} ms ack timeout",
            tx_config.max_retries,
            tx_config.ack_timeout_ms
        );
        Self {
            link,
            tx: HostCommTx::new(tx_config),
            rx: HostCommRx::new(rx_config),
            ticks: TickTracker::new(now_ms),
        }
    }

    /// Resets both state machines. Queued transfers are kept.
    pub fn init(&mut self) {
        self.tx.init();
        self.rx.init();
    }

    /// Restarts tick accounting from `now_ms`, for a clock that was swapped or reset.
    pub fn resync_clock(&mut self, now_ms: u32) {
        self.ticks = TickTracker::new(now_ms);
    }

    /// Advances every timer by `ticks` ticks.
    pub fn time_event_update(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.tx.time_event_update();
            self.rx.time_event_update();
        }
    }

    /// Runs one superloop iteration.
    ///
    /// # Returns
    /// The outcome of a transfer resolved during this iteration, if any.
    pub fn poll<C, H>(&mut self, clock: &C, handler: &mut H) -> Option<TransferOutcome>
    where
        C: Clock,
        H: PacketHandler,
    {
        let elapsed = self.ticks.elapsed_ticks(clock.now_ms());
        self.time_event_update(elapsed);
        let outcome = self.tx.run(&mut self.link);
        self.rx.run(&mut self.link, &self.tx, handler);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{HOST_COMM_RX_BYTE_TIMEOUT_MS, MAX_ACK_TIMEOUT_MS};
    use crate::error::Error;
    use crate::frame::PacketType;
    use crate::link::mock::MockLink;
    use crate::rx_fsm::RxErrorPolicy;
    use crate::timer::ManualClock;
    use crate::tx_fsm::TxState;

    /// Moves every byte written by one side into the other side's receive queue.
    fn deliver(from: &mut MockLink, to: &mut MockLink) {
        for wire in from.writes.drain(..) {
            to.incoming.extend(wire);
        }
    }

    fn ignore(_: PacketType, _: &[u8]) {}

    #[test]
    fn test_request_acknowledged_by_peer() {
        let clock = ManualClock::new(1_000);
        let mut device = HostComm::new(
            MockLink::new(),
            TxConfig::default(),
            RxConfig::default(),
            clock.now_ms(),
        );
        let mut host = HostComm::new(
            MockLink::new(),
            TxConfig::default(),
            RxConfig::default(),
            clock.now_ms(),
        );

        device
            .tx
            .enqueue_transfer(PacketType::Command(0x42), b"temp", true)
            .unwrap();

        let mut received = vec![];
        let mut on_host = |t: PacketType, p: &[u8]| received.push((t, p.to_vec()));
        let mut delivered = None;
        for _ in 0..10 {
            if let Some(outcome) = device.poll(&clock, &mut ignore) {
                delivered = Some(outcome);
            }
            deliver(&mut device.link, &mut host.link);
            let _ = host.poll(&clock, &mut on_host);
            deliver(&mut host.link, &mut device.link);
            clock.advance(1);
        }

        assert_eq!(
            delivered,
            Some(TransferOutcome::Delivered {
                packet_type: PacketType::Command(0x42),
                attempts: 1
            })
        );
        assert_eq!(received, vec![(PacketType::Command(0x42), b"temp".to_vec())]);
        assert_eq!(device.tx.state(), TxState::PollPendingTransfer);
        assert_eq!(device.tx.stats.retransmissions, 0);
    }

    #[test]
    fn test_peers_sending_at_once_both_deliver() {
        let clock = ManualClock::new(0);
        let mut device = HostComm::new(
            MockLink::new(),
            TxConfig::default(),
            RxConfig::default(),
            clock.now_ms(),
        );
        let mut host = HostComm::new(
            MockLink::new(),
            TxConfig::default(),
            RxConfig::default(),
            clock.now_ms(),
        );

        device
            .tx
            .enqueue_transfer(PacketType::Command(0x51), b"up", true)
            .unwrap();
        host.tx
            .enqueue_transfer(PacketType::Command(0x52), b"down", true)
            .unwrap();

        let mut device_outcome = None;
        let mut host_outcome = None;
        for _ in 0..10 {
            if let Some(o) = device.poll(&clock, &mut ignore) {
                device_outcome = Some(o);
            }
            if let Some(o) = host.poll(&clock, &mut ignore) {
                host_outcome = Some(o);
            }
            deliver(&mut device.link, &mut host.link);
            deliver(&mut host.link, &mut device.link);
            clock.advance(1);
        }

        assert_eq!(
            device_outcome,
            Some(TransferOutcome::Delivered {
                packet_type: PacketType::Command(0x51),
                attempts: 1
            })
        );
        assert_eq!(
            host_outcome,
            Some(TransferOutcome::Delivered {
                packet_type: PacketType::Command(0x52),
                attempts: 1
            })
        );
        assert_eq!(device.tx.stats.retransmissions, 0);
        assert_eq!(host.tx.stats.retransmissions, 0);
        assert_eq!(device.rx.rx_good, 2);
        assert_eq!(host.rx.rx_good, 2);
    }

    #[test]
    fn test_lost_frame_is_retransmitted_after_timeout() {
        let clock = ManualClock::new(0);
        let mut device = HostComm::new(
            MockLink::new(),
            TxConfig::default(),
            RxConfig::default(),
            clock.now_ms(),
        );

        device
            .tx
            .send_packet_no_payload(PacketType::Ping, true)
            .unwrap();
        let _ = device.poll(&clock, &mut ignore);
        assert_eq!(device.link.writes.len(), 1);
        device.link.writes.clear();

        clock.advance(MAX_ACK_TIMEOUT_MS - 1);
        let _ = device.poll(&clock, &mut ignore);
        assert!(device.link.writes.is_empty());

        clock.advance(1);
        let _ = device.poll(&clock, &mut ignore);
        assert_eq!(device.link.sent(), vec![(PacketType::Ping, vec![])]);
        assert_eq!(device.tx.retry_cnt(), 1);

        device.link.inject(PacketType::Ack, &[]);
        let _ = device.poll(&clock, &mut ignore);
        assert_eq!(
            device.poll(&clock, &mut ignore),
            Some(TransferOutcome::Delivered {
                packet_type: PacketType::Ping,
                attempts: 2
            })
        );
    }

    #[test]
    fn test_silent_peer_abandons_request() {
        let clock = ManualClock::new(u32::MAX - 10);
        let mut device = HostComm::new(
            MockLink::new(),
            TxConfig {
                max_retries: 1,
                ack_timeout_ms: 5,
            },
            RxConfig::default(),
            clock.now_ms(),
        );
        device
            .tx
            .enqueue_transfer(PacketType::Command(9), &[1, 2], true)
            .unwrap();

        let mut outcome = None;
        for _ in 0..50 {
            if let Some(o) = device.poll(&clock, &mut ignore) {
                outcome = Some(o);
            }
            clock.advance(1);
        }
        assert_eq!(
            outcome,
            Some(TransferOutcome::Failed {
                packet_type: PacketType::Command(9),
                error: Error::RetryBudgetExhausted { attempts: 2 }
            })
        );
        assert_eq!(device.link.writes.len(), 2);
    }

    #[test]
    fn test_corrupted_frame_is_nacked_and_resent() {
        let clock = ManualClock::new(0);
        let mut device = HostComm::new(
            MockLink::new(),
            TxConfig::default(),
            RxConfig::default(),
            clock.now_ms(),
        );
        let mut host = HostComm::new(
            MockLink::new(),
            TxConfig::default(),
            RxConfig {
                error_policy: RxErrorPolicy::Nack,
                ..RxConfig::default()
            },
            clock.now_ms(),
        );

        device
            .tx
            .enqueue_transfer(PacketType::Command(0x11), b"xyz", true)
            .unwrap();
        let _ = device.poll(&clock, &mut ignore);
        let mut corrupted = device.link.writes.remove(0);
        corrupted[5] ^= 0x04;
        host.link.incoming.extend(corrupted);

        let mut count = 0;
        let mut on_host = |_: PacketType, _: &[u8]| count += 1;
        let mut delivered = None;
        for _ in 0..10 {
            let _ = host.poll(&clock, &mut on_host);
            deliver(&mut host.link, &mut device.link);
            if let Some(o) = device.poll(&clock, &mut ignore) {
                delivered = Some(o);
            }
            deliver(&mut device.link, &mut host.link);
            clock.advance(1);
        }

        assert_eq!(host.rx.rx_bad, 1);
        assert_eq!(count, 1);
        assert_eq!(
            delivered,
            Some(TransferOutcome::Delivered {
                packet_type: PacketType::Command(0x11),
                attempts: 2
            })
        );
    }

    #[test]
    fn test_timer_pass_covers_skipped_ticks() {
        let clock = ManualClock::new(0);
        let mut device = HostComm::new(
            MockLink::new(),
            TxConfig::default(),
            RxConfig::default(),
            clock.now_ms(),
        );
        device.link.inject(PacketType::Ping, &[]);
        let _ = device.link.incoming.pop_back();
        let _ = device.poll(&clock, &mut ignore);

        clock.advance(HOST_COMM_RX_BYTE_TIMEOUT_MS);
        let _ = device.poll(&clock, &mut ignore);
        assert_eq!(device.rx.rx_bad, 1);

        device.init();
        assert_eq!(device.tx.state(), TxState::PollPendingTransfer);
    }

    #[test]
    fn test_resync_clock_forgets_elapsed_time() {
        let clock = ManualClock::new(500);
        let mut device = HostComm::new(
            MockLink::new(),
            TxConfig::default(),
            RxConfig::default(),
            0,
        );
        device
            .tx
            .send_packet_no_payload(PacketType::Ping, true)
            .unwrap();
        device.resync_clock(clock.now_ms());
        let _ = device.poll(&clock, &mut ignore);
        clock.advance(1);
        let _ = device.poll(&clock, &mut ignore);
        assert_eq!(device.link.writes.len(), 1);
        assert_eq!(device.tx.retry_cnt(), 0);
    }
}
