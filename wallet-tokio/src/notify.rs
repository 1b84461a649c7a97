//! # `notify` channel
//!
//! A notification channel which wraps [`tokio::sync::mpsc`] so that if
//! multiple notifications are sent before the receiver calls
//! [`Receiver::recv`], the receiver is only notified once. This keeps the
//! receiver from doing duplicate work.
//!
//! - `tx.send()` never blocks and doesn't care whether the channel is full or
//!   the receiver is gone.
//! - `rx.recv()` never resolves if all senders have been dropped.
//! - `rx.recv_debounced(window)` additionally waits out `window` after the
//!   first notification and swallows everything sent in the meantime, so a
//!   burst of notifications turns into exactly one wakeup.

use std::time::Duration;

use tokio::sync::mpsc;

/// Create a new `notify` channel returning a [`Sender`] (cloneable) and
/// [`Receiver`] (not cloneable), analogous to `mpsc::channel(1)`.
pub fn channel() -> (Sender, Receiver) {
    let (tx, rx) = mpsc::channel(1);
    (Sender(tx), Receiver(rx))
}

/// `notify` sender, analogous to `mpsc::Sender<()>`.
#[derive(Clone)]
pub struct Sender(mpsc::Sender<()>);

/// `notify` receiver, analogous to `mpsc::Receiver<()>`.
pub struct Receiver(mpsc::Receiver<()>);

impl Sender {
    /// Sends a notification to the [`Receiver`].
    pub fn send(&self) {
        let _ = self.0.try_send(());
    }
}

impl Receiver {
    /// Waits until a notification is received over the channel. Completes
    /// immediately if a notification has already been sent.
    ///
    /// NOTE: If all [`Sender`]s have been dropped, this never completes.
    pub async fn recv(&mut self) {
        match self.0.recv().await {
            Some(()) => (),
            None => std::future::pending().await,
        }
    }

    /// Waits for a notification, then waits out `window` and clears any
    /// notifications that arrived in the meantime.
    pub async fn recv_debounced(&mut self, window: Duration) {
        self.recv().await;
        tokio::time::sleep(window).await;
        self.clear();
    }

    /// Immediately returns whether a notification has been sent.
    #[must_use]
    pub fn try_recv(&mut self) -> bool {
        self.0.try_recv().is_ok()
    }

    /// Clears out any pending notifications in the channel.
    pub fn clear(&mut self) {
        while self.0.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod test {
    use tokio::time::{self, Instant};
    use tokio_test::{assert_pending, assert_ready};

    use super::*;

    #[test]
    fn notifications_coalesce() {
        let (tx, mut rx) = channel();
        tx.send();
        tx.send();
        tx.clone().send();

        assert!(rx.try_recv());
        assert!(!rx.try_recv());

        let mut recv = tokio_test::task::spawn(rx.recv());
        assert_pending!(recv.poll());
        tx.send();
        assert!(recv.is_woken());
        assert_ready!(recv.poll());
    }

    #[test]
    fn recv_never_resolves_without_senders() {
        let (tx, mut rx) = channel();
        drop(tx);
        let mut recv = tokio_test::task::spawn(rx.recv());
        assert_pending!(recv.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_swallows_burst() {
        let window = Duration::from_millis(500);
        let (tx, mut rx) = channel();

        let start = Instant::now();
        let burst = tokio::spawn({
            let tx = tx.clone();
            async move {
                for _ in 0..10 {
                    tx.send();
                    time::sleep(Duration::from_millis(40)).await;
                }
            }
        });

        rx.recv_debounced(window).await;
        assert_eq!(start.elapsed(), window);
        burst.await.unwrap();

        // The whole burst landed inside the window
        assert!(!rx.try_recv());

        // A later notification starts a fresh window
        tx.send();
        rx.recv_debounced(window).await;
        assert_eq!(start.elapsed(), 2 * window);
    }
}
