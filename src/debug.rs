//! Bounded debug message formatting.
//!
//! Debug text is routed to the host through the same transport as every other
//! packet. Messages are formatted into a fixed [`DBG_MSG_BUFF_SIZE`] buffer; a
//! message that does not fit is reported as [`Error::DebugMessageTooLong`]
//! instead of being silently truncated.

use core::fmt::{self, Write};

use heapless::String;

use crate::consts::DBG_MSG_BUFF_SIZE;
use crate::error::Error;

/// A formatted debug message.
pub type DebugMessage = String<DBG_MSG_BUFF_SIZE>;

/// Formats `args` into a [`DebugMessage`].
///
/// # Errors
/// [`Error::DebugMessageTooLong`] if the output exceeds [`DBG_MSG_BUFF_SIZE`] bytes.
pub fn format_debug_message(args: fmt::Arguments<'_>) -> Result<DebugMessage, Error> {
    let mut message = DebugMessage::new();
    message.write_fmt(args).map_err(|_| Error::DebugMessageTooLong {
        max: DBG_MSG_BUFF_SIZE,
    })?;
    Ok(message)
}

/// Formats a debug message and queues it on a [`HostCommTx`](crate::tx_fsm::HostCommTx).
///
/// Expands to a `Result<(), hostcomm::Error>`.
///
/// # Arguments
/// - `$tx`: the transmit state machine
/// - `$ack`: whether the host must acknowledge the message
/// - the rest: `format!`-style arguments
///
/// # Example
/// ```rust
/// use hostcomm::host_comm_printf;
/// use hostcomm::tx_fsm::HostCommTx;
///
/// let mut tx = HostCommTx::default();
/// let volts = 3.3;
/// host_comm_printf!(tx, false, "vbat {} V", volts).unwrap();
/// assert_eq!(tx.pending(), 1);
/// ```
#[macro_export]
macro_rules! host_comm_printf {
    ( $tx:expr, $ack:expr, $($arg:tt)* ) => {
        $tx.write_dbg_fmt(core::format_args!($($arg)*), $ack)
    };
}
