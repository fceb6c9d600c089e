/// Declares a static global `HOST_COMM_TX` instance protected by a `critical_section` mutex.
///
/// This macro creates a `static` singleton `HOST_COMM_TX` suitable for use in
/// interrupt-based environments, where both the superloop and an ISR need
/// to safely access the transmit state machine.
///
/// # Example
/// ```rust
/// hostcomm::init_host_comm!();
/// ```
#[macro_export]
macro_rules! init_host_comm {
    () => {
        pub static HOST_COMM_TX: $crate::critical_section::Mutex<
            core::cell::RefCell<Option<$crate::tx_fsm::HostCommTx>>,
        > = $crate::critical_section::Mutex::new(core::cell::RefCell::new(None));
    };
}

/// Initializes the global `HOST_COMM_TX` singleton with a new transmit machine.
///
/// # Arguments
/// - none: the default retry policy
/// - `$config`: a [`TxConfig`](crate::tx_fsm::TxConfig) expression
///
/// # Example
/// ```rust
/// hostcomm::init_host_comm!();
///
/// fn main() {
///     hostcomm::setup_host_comm!();
///     hostcomm::setup_host_comm!(hostcomm::tx_fsm::TxConfig {
///         max_retries: 5,
///         ack_timeout_ms: 100,
///     });
/// }
/// ```
///
/// # Notes
/// - Requires `init_host_comm!` to have been used earlier.
/// - Replaces any machine stored before, dropping its queue.
#[macro_export]
macro_rules! setup_host_comm {
    () => {
        $crate::setup_host_comm!($crate::tx_fsm::TxConfig::default())
    };
    ( $config:expr ) => {
        $crate::critical_section::with(|cs| {
            let _ = HOST_COMM_TX
                .borrow(cs)
                .replace(Some($crate::tx_fsm::HostCommTx::new($config)));
        })
    };
}

/// Posts an acknowledgement event into the global `HOST_COMM_TX`.
///
/// Evaluates to `true` if the event was stored.
///
/// # Example
/// ```rust
/// use hostcomm::tx_fsm::ExternalEvent;
/// hostcomm::init_host_comm!();
///
/// fn main() {
///     assert!(!hostcomm::post_host_comm_event!(ExternalEvent::AckReceived));
///     hostcomm::setup_host_comm!();
///     assert!(hostcomm::post_host_comm_event!(ExternalEvent::AckReceived));
/// }
/// ```
#[macro_export]
macro_rules! post_host_comm_event {
    ( $event:expr ) => {
        $crate::critical_section::with(|cs| {
            HOST_COMM_TX
                .borrow(cs)
                .borrow()
                .as_ref()
                .is_some_and(|tx| tx.set_external_event($event))
        })
    };
}

/// Advances the global millisecond counter and the timers of `HOST_COMM_TX`.
///
/// Intended to be invoked from the 1 ms timer interrupt.
///
/// # Example
/// ```rust
/// hostcomm::init_host_comm!();
///
/// // #[interrupt]
/// fn sys_tick() {
///     hostcomm::tick_host_comm_timer!();
/// }
///
/// fn main() {
///     hostcomm::setup_host_comm!();
///     sys_tick();
/// }
/// ```
///
/// # Notes
/// - This macro assumes `HOST_COMM_TX` was declared with `init_host_comm!`.
/// - Safe to call before `setup_host_comm!`; only the counter advances then.
/// - Do not also feed the same ticks through [`HostComm::poll`](crate::superloop::HostComm::poll),
///   or the transmit timers advance twice.
#[macro_export]
macro_rules! tick_host_comm_timer {
    () => {
        $crate::timer::systick_tick();
        $crate::critical_section::with(|cs| {
            if let Some(tx) = HOST_COMM_TX.borrow(cs).borrow_mut().as_mut() {
                tx.time_event_update();
            }
        });
    };
}
