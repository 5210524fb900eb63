//! Synchronization primitives for asynchronous rendering and scanout
//!
//! All completion tracking in the compositor goes through events: the renderer
//! signals an event when GPU work finishes, the display driver signals one when
//! it no longer scans an image out. The compositor itself only ever *polls*
//! events (zero timeout); a pending event means "busy", never "wait here".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A resettable software fence.
///
/// Clones share state: signaling one handle signals them all, which is how a
/// single event is shared between the compositor, the renderer and the display
/// driver. Events start out unsignaled.
#[derive(Debug, Default, Clone)]
pub struct Event {
    signaled: Arc<AtomicBool>,
}

impl Event {
    /// Create a new, unsignaled event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an event that is already signaled.
    pub fn signaled() -> Self {
        let event = Self::new();
        event.signal();
        event
    }

    /// Signal the event.
    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }

    /// Reset the event to the unsignaled state.
    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    /// Queries the state of the event without blocking.
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_starts_unsignaled() {
        assert!(!Event::new().is_signaled());
        assert!(Event::signaled().is_signaled());
    }

    #[test]
    fn clones_share_state() {
        let event = Event::new();
        let clone = event.clone();
        event.signal();
        assert!(clone.is_signaled());
        clone.reset();
        assert!(!event.is_signaled());
    }

    #[test]
    fn reset_and_resignal() {
        let event = Event::signaled();
        event.reset();
        assert!(!event.is_signaled());
        event.signal();
        assert!(event.is_signaled());
    }
}
