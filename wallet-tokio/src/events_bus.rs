use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};

/// Returned when a receiver fell behind and the channel overwrote events
/// before it could read them. The receiver stays usable; the next `recv`
/// continues from the oldest event still buffered.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
#[error("events receiver lagged and missed {0} events")]
pub struct Lagged(pub u64);

/// The [`EventsBus`] makes it easy to listen on events from some producer
/// (or possibly many producers).
///
/// - Simply clone the [`EventsBus`] to get another handle to it.
/// - Call [`send`] to send an event onto the bus. If no receivers are
///   registered, this is a noop.
/// - Call [`subscribe`] to get an owned receiver. Events emitted prior to
///   [`subscribe`] will not be received.
///
/// The bus is bounded. A receiver that can't keep up gets a [`Lagged`] error
/// from [`EventsRx::recv`] instead of silently losing events, so it can
/// resynchronize from the source of truth.
///
/// [`send`]: Self::send
/// [`subscribe`]: Self::subscribe
#[derive(Clone)]
pub struct EventsBus<T> {
    event_tx: broadcast::Sender<T>,
}

impl<T: Clone> EventsBus<T> {
    /// Create a new [`EventsBus`] with a custom channel size.
    pub fn new_with_size(size: usize) -> Self {
        Self {
            event_tx: broadcast::channel(size).0,
        }
    }

    /// Notify all receivers (if any) that an event occurred.
    pub fn send(&self, event: T) {
        // `broadcast::Sender::send` returns an error if there are no active
        // receivers. That's fine for us.
        let _ = self.event_tx.send(event);
    }

    /// Get a receiver which will get all events sent after this point.
    ///
    /// Be sure to start tailing events quickly so they don't queue up.
    pub fn subscribe(&self) -> EventsRx<T> {
        EventsRx {
            _event_tx: self.event_tx.clone(),
            event_rx: self.event_tx.subscribe(),
        }
    }

    /// The number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.event_tx.receiver_count()
    }
}

/// An owned receiver for an [`EventsBus`]. Dropping it unsubscribes.
pub struct EventsRx<T> {
    // Hold on to a sender handle so the channel can't close while we're
    // waiting.
    _event_tx: broadcast::Sender<T>,
    event_rx: broadcast::Receiver<T>,
}

impl<T: Clone> EventsRx<T> {
    /// Wait for the next event.
    ///
    /// Will wait indefinitely, so ensure there's a timeout or shutdown signal
    /// around this.
    pub async fn recv(&mut self) -> Result<T, Lagged> {
        self.recv_filtered(|_| true).await
    }

    /// Wait for the next event that makes `filter` return true.
    pub async fn recv_filtered(
        &mut self,
        filter: impl Fn(&T) -> bool,
    ) -> Result<T, Lagged> {
        loop {
            match self.event_rx.recv().await {
                Ok(event) =>
                    if filter(&event) {
                        return Ok(event);
                    },
                Err(RecvError::Lagged(missed)) => return Err(Lagged(missed)),
                Err(RecvError::Closed) => std::future::pending().await,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio_test::{assert_pending, assert_ready_eq};

    use super::*;

    #[test]
    fn send_without_receivers_is_noop() {
        let bus = EventsBus::<u32>::new_with_size(4);
        bus.send(1);
        assert_eq!(bus.receiver_count(), 0);

        let rx = bus.subscribe();
        assert_eq!(bus.receiver_count(), 1);
        drop(rx);
        assert_eq!(bus.receiver_count(), 0);
    }

    #[test]
    fn filtered_recv_skips_unmatched() {
        let bus = EventsBus::<u32>::new_with_size(4);
        let mut rx = bus.subscribe();

        let mut recv = tokio_test::task::spawn(rx.recv_filtered(|x| x % 2 == 0));
        assert_pending!(recv.poll());

        bus.send(1);
        bus.send(3);
        assert_pending!(recv.poll());

        bus.send(4);
        assert!(recv.is_woken());
        assert_ready_eq!(recv.poll(), Ok(4));
    }

    #[tokio::test(start_paused = true)]
    async fn lagged_receiver_is_told() {
        let bus = EventsBus::<u32>::new_with_size(2);
        let mut rx = bus.subscribe();

        for i in 0..5 {
            bus.send(i);
        }

        assert_eq!(rx.recv().await, Err(Lagged(3)));
        // Continues with the oldest retained events
        assert_eq!(rx.recv().await, Ok(3));
        assert_eq!(rx.recv().await, Ok(4));

        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv());
        assert!(next.await.is_err(), "No more events");
    }
}
