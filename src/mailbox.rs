//! Single-slot event mailbox shared between execution contexts.
//!
//! The receive path (often an interrupt handler) posts acknowledgement events
//! and the superloop consumes them. Both sides go through
//! `critical_section::with`, so an event is always read or written whole.
//!
//! The slot holds at most one event. A post into an occupied slot is refused
//! and the pending event is left untouched; the reader must [`take`](EventMailbox::take)
//! it before the next post can land.

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;

/// A single-writer/single-reader hand-off slot.
pub struct EventMailbox<T: Copy> {
    slot: Mutex<Cell<Option<T>>>,
}

impl<T: Copy> EventMailbox<T> {
    /// Creates an empty mailbox. Usable in `static` items.
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(None)),
        }
    }

    /// Posts `event` if the slot is empty.
    ///
    /// # Returns
    /// - `true`: the event was stored
    /// - `false`: an unconsumed event was already pending; `event` was dropped
    pub fn post(&self, event: T) -> bool {
        critical_section::with(|cs| {
            let slot = self.slot.borrow(cs);
            if slot.get().is_some() {
                false
            } else {
                slot.set(Some(event));
                true
            }
        })
    }

    /// Removes and returns the pending event, if any.
    pub fn take(&self) -> Option<T> {
        critical_section::with(|cs| self.slot.borrow(cs).take())
    }

    /// Returns the pending event without consuming it.
    pub fn peek(&self) -> Option<T> {
        critical_section::with(|cs| self.slot.borrow(cs).get())
    }

    /// Drops any pending event.
    pub fn clear(&self) {
        critical_section::with(|cs| self.slot.borrow(cs).set(None));
    }
}

impl<T: Copy> Default for EventMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for EventMailbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMailbox")
            .field("pending", &self.peek())
            .finish()
    }
}
