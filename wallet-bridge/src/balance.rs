use std::sync::Arc;

#[cfg(any(test, feature = "test-utils"))]
use proptest_derive::Arbitrary;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use wallet_tokio::notify_once::NotifyOnce;

use crate::{
    event::{DomainEvent, Subscription},
    ffi::{error::FfiError, types::FfiBalance},
    tx::Amount,
    wallet::Wallet,
};

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Balance {
    pub available: Amount,
    pub pending_incoming: Amount,
    pub pending_outgoing: Amount,
    pub time_locked: Amount,
}

impl Balance {
    pub(crate) fn read(balance: &FfiBalance) -> Result<Self, FfiError> {
        Ok(Self {
            available: Amount(balance.available()?),
            pending_incoming: Amount(balance.pending_incoming()?),
            pending_outgoing: Amount(balance.pending_outgoing()?),
            time_locked: Amount(balance.time_locked()?),
        })
    }
}

/// The last known wallet balance. Always replaced wholesale.
pub struct BalanceCache {
    balance_tx: watch::Sender<Balance>,
}

impl Default for BalanceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BalanceCache {
    pub fn new() -> Self {
        Self {
            balance_tx: watch::Sender::new(Balance::default()),
        }
    }

    pub fn current(&self) -> Balance {
        *self.balance_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Balance> {
        self.balance_tx.subscribe()
    }

    pub fn replace(&self, balance: Balance) {
        self.balance_tx.send_if_modified(|current| {
            let changed = *current != balance;
            *current = balance;
            changed
        });
    }

    /// Re-read the balance from the engine.
    pub fn refresh(&self, wallet: &Wallet) -> Result<Balance, FfiError> {
        let balance = wallet.balance()?;
        self.replace(balance);
        Ok(balance)
    }

    /// Apply `BalanceUpdated` events until shutdown. A lagged subscription
    /// falls back to re-reading the balance.
    #[instrument(skip_all, name = "(balance)")]
    pub async fn run(
        self: Arc<Self>,
        wallet: Arc<Wallet>,
        mut events: Subscription,
        mut shutdown: NotifyOnce,
    ) {
        loop {
            tokio::select! {
                () = shutdown.recv() => break,
                event = events.recv() => match event {
                    Ok(DomainEvent::BalanceUpdated(balance)) => {
                        debug!(?balance, "Balance updated");
                        self.replace(balance);
                    }
                    Ok(_) => (),
                    Err(e) => {
                        warn!("{e:#}; re-reading balance");
                        if let Err(e) = self.refresh(&wallet) {
                            warn!("Failed to refresh balance: {e:#}");
                        }
                    }
                },
            }
        }
        info!("Balance task shutting down");
    }
}
