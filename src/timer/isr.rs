use crate::timer::Clock;
use crate::tx_fsm::{ExternalEvent, HostCommTx, TxConfig};
use core::cell::{Cell, RefCell};
use critical_section::Mutex;

static TICKS: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

/// Advances the global millisecond counter by one tick.
///
/// Call it from the periodic timer interrupt.
///
/// # Example
/// ```rust
/// use hostcomm::timer::{systick_tick, tick_count};
///
/// // #[interrupt]
/// fn sys_tick() {
///     systick_tick();
/// }
///
/// let before = tick_count();
/// sys_tick();
/// assert!(tick_count().wrapping_sub(before) >= 1);
/// ```
pub fn systick_tick() {
    critical_section::with(|cs| {
        let ticks = TICKS.borrow(cs);
        ticks.set(ticks.get().wrapping_add(1));
    });
}

/// Reads the global millisecond counter.
pub fn tick_count() -> u32 {
    critical_section::with(|cs| TICKS.borrow(cs).get())
}

/// [`Clock`] backed by the counter advanced by [`systick_tick`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SysTickClock;

impl Clock for SysTickClock {
    fn now_ms(&self) -> u32 {
        tick_count()
    }
}

/// Used to initialize a global static [`HostCommTx`] for use with
/// `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
///
/// # Example
/// ```rust
/// use core::cell::RefCell;
/// use critical_section::Mutex;
/// use hostcomm::timer::global_host_comm_init;
/// use hostcomm::tx_fsm::HostCommTx;
///
/// static HOST_COMM_TX: Mutex<RefCell<Option<HostCommTx>>> = global_host_comm_init();
/// ```
pub const fn global_host_comm_init() -> Mutex<RefCell<Option<HostCommTx>>> {
    Mutex::new(RefCell::new(None))
}

/// Stores a freshly initialized transmit machine in the global.
///
/// # Arguments
/// * The global static handle
/// * The retry policy
pub fn global_host_comm_setup(
    global_tx: &'static Mutex<RefCell<Option<HostCommTx>>>,
    config: TxConfig,
) {
    critical_section::with(|cs| {
        let _ = global_tx.borrow(cs).replace(Some(HostCommTx::new(config)));
    });
}

/// Posts an acknowledgement event, typically from a UART interrupt.
///
/// # Returns
/// `false` if the global is not set up or the mailbox already holds an event.
pub fn global_host_comm_post_event(
    global_tx: &'static Mutex<RefCell<Option<HostCommTx>>>,
    event: ExternalEvent,
) -> bool {
    critical_section::with(|cs| {
        global_tx
            .borrow(cs)
            .borrow()
            .as_ref()
            .is_some_and(|tx| tx.set_external_event(event))
    })
}

/// Runs `f` on the global transmit machine inside a critical section.
///
/// # Returns
/// `None` if the global is not set up.
///
/// # Example
/// ```rust
/// use core::cell::RefCell;
/// use critical_section::Mutex;
/// use hostcomm::frame::PacketType;
/// use hostcomm::timer::{global_host_comm_init, global_host_comm_setup, global_host_comm_with};
/// use hostcomm::tx_fsm::HostCommTx;
///
/// static HOST_COMM_TX: Mutex<RefCell<Option<HostCommTx>>> = global_host_comm_init();
///
/// global_host_comm_setup(&HOST_COMM_TX, Default::default());
/// let queued = global_host_comm_with(&HOST_COMM_TX, |tx| {
///     tx.send_packet_no_payload(PacketType::Ping, false)
/// });
/// assert_eq!(queued, Some(Ok(())));
/// ```
///
/// # Notes
/// - Interrupts stay masked for the whole of `f`. When `f` calls
///   [`HostCommTx::run`], that includes framing the request and the
///   [`ByteLink::write`](crate::link::ByteLink::write) hand-off, so the link's
///   `write` must only queue bytes and never wait for them to drain.
/// - Keep `f` short. Interrupt handlers should post through
///   [`global_host_comm_post_event`], which holds the lock only long enough to
///   fill the mailbox.
pub fn global_host_comm_with<R>(
    global_tx: &'static Mutex<RefCell<Option<HostCommTx>>>,
    f: impl FnOnce(&mut HostCommTx) -> R,
) -> Option<R> {
    critical_section::with(|cs| global_tx.borrow(cs).borrow_mut().as_mut().map(f))
}
