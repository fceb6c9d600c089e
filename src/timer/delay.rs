use crate::link::ByteLink;
use crate::rx_fsm::PacketHandler;
use crate::superloop::HostComm;
use crate::timer::{Clock, ManualClock};
use crate::tx_fsm::TransferOutcome;
use embedded_hal::delay::DelayNs;

/// Runs a blocking superloop that polls the transport once per tick.
///
/// This is a simple timing loop for firmware without a tick interrupt. Time is
/// counted by the loop itself: every iteration sleeps `tick_ms` and advances a
/// [`ManualClock`] by the same amount, so timeouts stretch by however long one
/// poll takes.
///
/// # Arguments
/// - `host`: the transport
/// - `handler`: receives every inbound packet
/// - `delay`: a delay provider implementing `DelayNs`, typically from the HAL
/// - `tick_ms`: the delay between two polls, in milliseconds
///
/// # Example
/// ```rust,ignore
/// use hostcomm::superloop::HostComm;
/// use hostcomm::timer::run_host_comm_loop;
///
/// let mut host = HostComm::new(uart, Default::default(), Default::default(), 0);
/// run_host_comm_loop(&mut host, &mut |ty, payload| dispatch(ty, payload), &mut delay, 1);
/// ```
///
/// # Notes
/// - This loop will never return; it is intended for single-purpose polling firmware.
/// - Transfer outcomes are dropped; use [`HostComm::poll`] directly to observe them.
pub fn run_host_comm_loop<L, H, D>(
    host: &mut HostComm<L>,
    handler: &mut H,
    delay: &mut D,
    tick_ms: u32,
) -> !
where
    L: ByteLink,
    H: PacketHandler,
    D: DelayNs,
{
    let clock = ManualClock::new(0);
    host.init();
    host.resync_clock(clock.now_ms());
    loop {
        let _ = loop_iteration(host, &clock, handler, delay, tick_ms);
    }
}

fn loop_iteration<L, H, D>(
    host: &mut HostComm<L>,
    clock: &ManualClock,
    handler: &mut H,
    delay: &mut D,
    tick_ms: u32,
) -> Option<TransferOutcome>
where
    L: ByteLink,
    H: PacketHandler,
    D: DelayNs,
{
    let outcome = host.poll(clock, handler);
    delay.delay_ms(tick_ms);
    clock.advance(tick_ms);
    outcome
}
