use std::sync::Arc;

use tokio::sync::watch;

/// A signal that is sent at most once and observed by every handle, most
/// commonly used for shutdown.
///
/// - Clone to get another handle; any handle can send.
/// - Each handle observes the signal at most once via [`recv`]. A handle
///   cloned after the signal was sent still observes it once.
/// - Sending more than once is harmless.
///
/// [`recv`]: NotifyOnce::recv
#[derive(Debug)]
pub struct NotifyOnce {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    have_recved: bool,
}

impl NotifyOnce {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            have_recved: false,
        }
    }

    /// Send the signal, waking every handle waiting in [`recv`].
    ///
    /// [`recv`]: NotifyOnce::recv
    pub fn send(&self) {
        self.tx.send_replace(true);
    }

    /// Wait for the signal.
    ///
    /// NOTE: If this handle has already observed the signal, _this future
    /// never resolves_.
    pub async fn recv(&mut self) {
        if self.have_recved {
            return std::future::pending().await;
        }
        // We hold the sender, so `wait_for` can't fail on a closed channel.
        let _ = self.rx.wait_for(|sent| *sent).await;
        self.have_recved = true;
    }

    /// Immediately returns whether the signal has been sent. Does not consume
    /// the signal for a later [`recv`](Self::recv).
    #[must_use]
    pub fn try_recv(&self) -> bool {
        *self.rx.borrow()
    }
}

impl Clone for NotifyOnce {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
            // Every clone gets its own chance to observe the signal.
            have_recved: false,
        }
    }
}

#[cfg(test)]
mod test {
    use tokio_test::{assert_pending, assert_ready};

    use super::*;

    #[test]
    fn repeated_send_is_harmless() {
        let signal = NotifyOnce::new();
        assert!(!signal.try_recv());
        signal.send();
        signal.send();
        assert!(signal.try_recv());
    }

    #[test]
    fn each_handle_observes_once() {
        let sender = NotifyOnce::new();
        let mut waiter = sender.clone();

        {
            let mut recv = tokio_test::task::spawn(waiter.recv());
            assert_pending!(recv.poll());
            sender.send();
            assert!(recv.is_woken());
            assert_ready!(recv.poll());
        }

        // Observed already, so a second recv on the same handle stays pending
        {
            let mut recv = tokio_test::task::spawn(waiter.recv());
            assert_pending!(recv.poll());
            sender.send();
            assert_pending!(recv.poll());
        }

        // A fresh clone sees the signal immediately
        let mut late = waiter.clone();
        let mut recv = tokio_test::task::spawn(late.recv());
        assert_ready!(recv.poll());
    }
}
