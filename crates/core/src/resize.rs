//! A depth-1, newest-wins queue of PTY resize events.
//!
//! Terminal applications care about the *current* size, not every
//! transitional one a fast resize drag produces; buffering every event would
//! let the consumer fall behind and replay stale sizes. `watch` gives us
//! exactly the semantics the gateway needs: the consumer always sees the
//! latest value, and closing the producer is observable as a single
//! terminal signal rather than a stream of errors.

use tokio::sync::watch;

/// Terminal dimensions in character cells.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

/// Producer half of a resize queue. Dropping it is what causes the
/// consumer's `next()` to return `None`.
#[derive(Clone, Debug)]
pub struct ResizeProducer {
    tx: watch::Sender<TerminalSize>,
}

impl ResizeProducer {
    /// Publishes a new size, superseding any not-yet-observed previous one.
    pub fn push(&self, size: TerminalSize) {
        // An error here means the consumer half was dropped; the producer
        // has nothing useful to do but let the push be a no-op.
        let _ = self.tx.send(size);
    }
}

/// Consumer half of a resize queue.
#[derive(Debug)]
pub struct ResizeQueue {
    rx: watch::Receiver<TerminalSize>,
    seen_initial: bool,
}

impl ResizeQueue {
    /// Builds a queue seeded with the session's initial PTY size.
    #[must_use]
    pub fn new(initial: TerminalSize) -> (ResizeProducer, Self) {
        let (tx, rx) = watch::channel(initial);
        (ResizeProducer { tx }, Self { rx, seen_initial: false })
    }

    /// Returns the next size to apply, or `None` once the producer has been
    /// dropped and every pending size has been consumed.
    ///
    /// The very first call returns the session's initial size immediately,
    /// without waiting for a resize event.
    pub async fn next(&mut self) -> Option<TerminalSize> {
        if !self.seen_initial {
            self.seen_initial = true;
            return Some(*self.rx.borrow_and_update());
        }

        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

#[cfg(test)]
mod tests {
    use super::{ResizeQueue, TerminalSize};

    #[tokio::test]
    async fn first_call_returns_initial_size() {
        let (_producer, mut queue) = ResizeQueue::new(TerminalSize { rows: 24, cols: 80 });
        assert_eq!(queue.next().await, Some(TerminalSize { rows: 24, cols: 80 }));
    }

    #[tokio::test]
    async fn coalesces_bursts_to_the_newest_value() {
        let (producer, mut queue) = ResizeQueue::new(TerminalSize { rows: 24, cols: 80 });
        assert_eq!(queue.next().await, Some(TerminalSize { rows: 24, cols: 80 }));

        producer.push(TerminalSize { rows: 30, cols: 100 });
        producer.push(TerminalSize { rows: 40, cols: 120 });

        assert_eq!(queue.next().await, Some(TerminalSize { rows: 40, cols: 120 }));
    }

    #[tokio::test]
    async fn dropping_producer_yields_sentinel() {
        let (producer, mut queue) = ResizeQueue::new(TerminalSize { rows: 24, cols: 80 });
        let _ = queue.next().await;
        drop(producer);
        assert_eq!(queue.next().await, None);
    }
}
