//! Base-node sync tracking.
//!
//! A sync round starts TXO and TX validation on the engine, each of which
//! returns a request id and later completes with a `ValidationComplete`
//! event echoing that id. The round succeeds once both complete
//! successfully, fails as soon as either reports failure, and times out
//! after `validation_timeout`. Failed rounds are retried with backoff up to
//! `sync_max_attempts` times.
//!
//! Results for any other request id, or arriving when no round is in
//! flight, are stale and dropped. A result may arrive before the call that
//! started it has returned its id; it is held until the id is known.
//!
//! Independently of rounds, the first successful TX validation restarts tx
//! broadcast, once per tracker.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Context, anyhow};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, instrument, warn};
use wallet_tokio::{backoff, notify_once::NotifyOnce};

use crate::{
    config::BridgeConfig,
    event::{
        ConnectivityStatus, DomainEvent, EventKind, Subscription,
        ValidationKind,
    },
    wallet::Wallet,
};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, strum::Display)]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Synced,
    Failed,
}

/// The events [`SyncTracker::run`] needs.
pub const SYNC_EVENTS: &[EventKind] =
    &[EventKind::ValidationComplete, EventKind::ConnectivityChanged];

pub struct SyncTracker {
    round: Mutex<Option<Round>>,
    /// Serializes [`SyncTracker::sync`] calls so rounds never overlap.
    sync_lock: tokio::sync::Mutex<()>,
    status_tx: watch::Sender<SyncStatus>,
    connectivity_tx: watch::Sender<ConnectivityStatus>,
    /// Set once tx broadcast has been restarted after a successful TX
    /// validation. Only the first success restarts it, in or out of a round.
    broadcast_restarted: AtomicBool,
    timeout: Duration,
    max_attempts: u32,
}

struct Round {
    txo: Slot,
    tx: Slot,
    done: Option<oneshot::Sender<bool>>,
}

#[derive(Default)]
struct Slot {
    /// `None` until the start call returns.
    request_id: Option<u64>,
    result: Option<bool>,
    /// Results received while `request_id` is still unknown.
    early: Vec<(u64, bool)>,
}

impl Round {
    fn new(done: oneshot::Sender<bool>) -> Self {
        Self {
            txo: Slot::default(),
            tx: Slot::default(),
            done: Some(done),
        }
    }

    fn slot_mut(&mut self, is_tx: bool) -> &mut Slot {
        if is_tx { &mut self.tx } else { &mut self.txo }
    }

    fn notify_if_decided(&mut self) {
        if let Some(outcome) = self.outcome()
            && let Some(done) = self.done.take()
        {
            let _ = done.send(outcome);
        }
    }

    /// `Some` once the round's outcome is decided.
    fn outcome(&self) -> Option<bool> {
        match (self.txo.result, self.tx.result) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        }
    }
}

impl SyncTracker {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            round: Mutex::new(None),
            sync_lock: tokio::sync::Mutex::new(()),
            status_tx: watch::Sender::new(SyncStatus::Idle),
            connectivity_tx: watch::Sender::new(ConnectivityStatus::default()),
            broadcast_restarted: AtomicBool::new(false),
            timeout: config.validation_timeout,
            max_attempts: config.sync_max_attempts,
        }
    }

    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub fn connectivity(&self) -> watch::Receiver<ConnectivityStatus> {
        self.connectivity_tx.subscribe()
    }

    /// Sync with the base node, retrying failed rounds.
    #[instrument(skip_all, name = "(sync)")]
    pub async fn sync(&self, wallet: &Wallet) -> anyhow::Result<()> {
        let _guard = self.sync_lock.lock().await;
        self.status_tx.send_replace(SyncStatus::Syncing);

        let mut backoff_durations = backoff::get_backoff_iter();
        for attempt in 1..=self.max_attempts {
            match self.sync_once(wallet).await {
                Ok(()) => {
                    info!(%attempt, "Base node sync complete");
                    self.status_tx.send_replace(SyncStatus::Synced);
                    return Ok(());
                }
                Err(e) => warn!(%attempt, "Sync round failed: {e:#}"),
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(backoff_durations.next().unwrap()).await;
            }
        }

        self.status_tx.send_replace(SyncStatus::Failed);
        Err(anyhow!("Sync failed after {} attempts", self.max_attempts))
    }

    async fn sync_once(&self, wallet: &Wallet) -> anyhow::Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        *self.round.lock().unwrap() = Some(Round::new(done_tx));
        if let Err(e) = self.start_validations(wallet) {
            *self.round.lock().unwrap() = None;
            return Err(e);
        }

        let result = tokio::time::timeout(self.timeout, done_rx).await;
        // The round is over either way; anything arriving later is stale.
        *self.round.lock().unwrap() = None;

        match result {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(anyhow!("Validation reported failure")),
            Ok(Err(_)) => Err(anyhow!("Round was abandoned")),
            Err(_) => Err(anyhow!("Timed out after {:?}", self.timeout)),
        }
    }

    /// Start both validations, recording each id as soon as it's known. The
    /// engine may call back before a start call returns, so no lock is held
    /// across them.
    fn start_validations(&self, wallet: &Wallet) -> anyhow::Result<()> {
        let txo = wallet
            .start_txo_validation()
            .context("Failed to start TXO validation")?;
        self.set_request_id(false, txo);
        let tx = wallet
            .start_tx_validation()
            .context("Failed to start TX validation")?;
        self.set_request_id(true, tx);
        debug!(%txo, %tx, "Started validation");
        Ok(())
    }

    fn set_request_id(&self, is_tx: bool, request_id: u64) {
        let mut guard = self.round.lock().unwrap();
        let Some(round) = guard.as_mut() else {
            return;
        };
        let slot = round.slot_mut(is_tx);
        slot.request_id = Some(request_id);
        slot.result = slot
            .early
            .iter()
            .find(|(id, _)| *id == request_id)
            .map(|(_, success)| *success);
        slot.early.clear();
        round.notify_if_decided();
    }

    pub fn handle_event(&self, wallet: &Wallet, event: &DomainEvent) {
        match event {
            DomainEvent::ValidationComplete {
                request_id,
                kind,
                success,
            } => {
                let is_tx = *kind == ValidationKind::Tx;
                self.record_result(*request_id, is_tx, *success);
                if is_tx
                    && *success
                    && !self.broadcast_restarted.swap(true, Ordering::Relaxed)
                {
                    self.restart_broadcast(wallet);
                }
            }
            DomainEvent::ConnectivityChanged(status) => {
                info!(%status, "Base node connectivity changed");
                self.connectivity_tx.send_replace(*status);
            }
            _ => (),
        }
    }

    /// Record a validation result against the round in flight, if any.
    fn record_result(&self, request_id: u64, is_tx: bool, success: bool) {
        let mut guard = self.round.lock().unwrap();
        let Some(round) = guard.as_mut() else {
            debug!(%request_id, "No sync in flight; ignoring result");
            return;
        };
        let slot = round.slot_mut(is_tx);
        match slot.request_id {
            None => {
                slot.early.push((request_id, success));
                return;
            }
            Some(expected) if expected != request_id => {
                debug!(
                    %request_id,
                    %expected,
                    "Ignoring stale validation result",
                );
                return;
            }
            Some(_) => slot.result = Some(success),
        }
        round.notify_if_decided();
    }

    fn restart_broadcast(&self, wallet: &Wallet) {
        match wallet.restart_tx_broadcast() {
            Ok(_) => info!("Restarted tx broadcast"),
            Err(e) => {
                warn!("Failed to restart tx broadcast: {e:#}");
                self.broadcast_restarted.store(false, Ordering::Relaxed);
            }
        }
    }

    /// Feed validation and connectivity events into the tracker until
    /// shutdown.
    #[instrument(skip_all, name = "(sync-events)")]
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
                    Ok(event) => self.handle_event(&wallet, &event),
                    // A lost result just lets the round time out and retry.
                    Err(e) => warn!("{e:#}"),
                },
            }
        }
        info!("Sync events task shutting down");
    }
}

#[cfg(test)]
mod test {
    use tokio::task::JoinHandle;

    use super::*;
    use crate::{ffi::mock::MockEngine, wallet::test_utils::mock_wallet};

    fn config() -> BridgeConfig {
        BridgeConfig {
            validation_timeout: Duration::from_secs(120),
            sync_max_attempts: 3,
            ..BridgeConfig::default()
        }
    }

    fn result(request_id: u64, kind: ValidationKind, success: bool) -> DomainEvent {
        DomainEvent::ValidationComplete {
            request_id,
            kind,
            success,
        }
    }

    /// The (txo, tx) request ids of the latest round.
    fn latest_ids(mock: &MockEngine) -> (u64, u64) {
        let tx = mock.with_wallet(|w| w.next_request_id);
        (tx - 1, tx)
    }

    fn spawn_sync(
        tracker: &Arc<SyncTracker>,
        wallet: &Arc<Wallet>,
    ) -> JoinHandle<anyhow::Result<()>> {
        let tracker = tracker.clone();
        let wallet = wallet.clone();
        tokio::spawn(async move { tracker.sync(&wallet).await })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_ids_are_ignored() {
        let (mock, _bus, wallet) = mock_wallet();
        let wallet = Arc::new(wallet);
        let tracker = Arc::new(SyncTracker::new(&config()));
        let status = tracker.status();

        let sync = spawn_sync(&tracker, &wallet);
        settle().await;
        let (txo, tx) = latest_ids(&mock);

        tracker.handle_event(&wallet, &result(999, ValidationKind::Txo, false));
        tracker.handle_event(&wallet, &result(txo, ValidationKind::Tx, false));
        settle().await;
        assert_eq!(*status.borrow(), SyncStatus::Syncing);

        tracker.handle_event(&wallet, &result(txo, ValidationKind::Txo, true));
        tracker.handle_event(&wallet, &result(tx, ValidationKind::Tx, true));
        sync.await.unwrap().unwrap();
        assert_eq!(*status.borrow(), SyncStatus::Synced);
        assert_eq!(mock.with_wallet(|w| w.broadcast_restarts), 1);

        // Only the first successful TX validation restarts broadcast
        let sync = spawn_sync(&tracker, &wallet);
        settle().await;
        let (txo, tx) = latest_ids(&mock);
        tracker.handle_event(&wallet, &result(tx, ValidationKind::Tx, true));
        tracker.handle_event(&wallet, &result(txo, ValidationKind::Txo, true));
        sync.await.unwrap().unwrap();
        assert_eq!(mock.with_wallet(|w| w.broadcast_restarts), 1);

        Arc::into_inner(wallet).unwrap().destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_retry_then_fail() {
        let (mock, _bus, wallet) = mock_wallet();
        let wallet = Arc::new(wallet);
        let tracker = Arc::new(SyncTracker::new(&config()));

        let sync = spawn_sync(&tracker, &wallet);
        let sync_result = sync.await.unwrap();
        assert!(sync_result.is_err());
        assert_eq!(*tracker.status().borrow(), SyncStatus::Failed);
        assert_eq!(mock.call_count("wallet_start_txo_validation"), 3);
        assert_eq!(mock.call_count("wallet_start_tx_validation"), 3);

        // A late result for the last round doesn't change the status, but a
        // first successful TX validation still restarts broadcast
        let (txo, tx) = latest_ids(&mock);
        tracker.handle_event(&wallet, &result(txo, ValidationKind::Txo, true));
        tracker.handle_event(&wallet, &result(tx, ValidationKind::Tx, true));
        assert_eq!(*tracker.status().borrow(), SyncStatus::Failed);
        assert_eq!(mock.with_wallet(|w| w.broadcast_restarts), 1);
        tracker.handle_event(&wallet, &result(tx, ValidationKind::Tx, true));
        assert_eq!(mock.with_wallet(|w| w.broadcast_restarts), 1);

        Arc::into_inner(wallet).unwrap().destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_result_retries() {
        let (mock, _bus, wallet) = mock_wallet();
        let wallet = Arc::new(wallet);
        let tracker = Arc::new(SyncTracker::new(&config()));

        let sync = spawn_sync(&tracker, &wallet);
        settle().await;
        let (txo, _) = latest_ids(&mock);
        tracker.handle_event(&wallet, &result(txo, ValidationKind::Txo, false));

        // Next round starts after the first backoff
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(mock.call_count("wallet_start_txo_validation"), 2);
        let (txo, tx) = latest_ids(&mock);
        tracker.handle_event(&wallet, &result(txo, ValidationKind::Txo, true));
        tracker.handle_event(&wallet, &result(tx, ValidationKind::Tx, true));
        sync.await.unwrap().unwrap();
        assert_eq!(*tracker.status().borrow(), SyncStatus::Synced);

        Arc::into_inner(wallet).unwrap().destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn results_during_start_calls() {
        let (mock, _bus, wallet) = mock_wallet();
        let wallet = Arc::new(wallet);
        let tracker = Arc::new(SyncTracker::new(&config()));

        // The engine reports both results synchronously from inside the TX
        // start call, before its id has been returned.
        let hook_mock = mock.clone();
        let hook_tracker = tracker.clone();
        mock.run_before_call("wallet_start_tx_validation", 0, move || {
            let txo = hook_mock.with_wallet(|w| w.next_request_id);
            let tx = txo + 1;
            hook_tracker.record_result(txo, false, true);
            hook_tracker.record_result(tx + 10, true, false);
            hook_tracker.record_result(tx, true, true);
        });

        let sync = spawn_sync(&tracker, &wallet);
        sync.await.unwrap().unwrap();
        assert_eq!(*tracker.status().borrow(), SyncStatus::Synced);
        assert_eq!(mock.call_count("wallet_start_tx_validation"), 1);

        Arc::into_inner(wallet).unwrap().destroy();
    }

    #[test]
    fn broadcast_restarts_once_outside_rounds() {
        let (mock, _bus, wallet) = mock_wallet();
        let tracker = SyncTracker::new(&config());

        tracker.handle_event(&wallet, &result(7, ValidationKind::Tx, false));
        tracker.handle_event(&wallet, &result(7, ValidationKind::Txo, true));
        assert_eq!(mock.with_wallet(|w| w.broadcast_restarts), 0);

        tracker.handle_event(&wallet, &result(8, ValidationKind::Tx, true));
        tracker.handle_event(&wallet, &result(9, ValidationKind::Tx, true));
        assert_eq!(mock.with_wallet(|w| w.broadcast_restarts), 1);
        assert_eq!(*tracker.status().borrow(), SyncStatus::Idle);

        wallet.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn start_failure_is_a_failed_round() {
        let (mock, _bus, wallet) = mock_wallet();
        let wallet = Arc::new(wallet);
        let tracker = Arc::new(SyncTracker::new(&config()));
        mock.fail_call("wallet_start_tx_validation", 1);

        let sync = spawn_sync(&tracker, &wallet);
        assert!(sync.await.unwrap().is_err());
        assert_eq!(mock.call_count("wallet_start_tx_validation"), 3);
        assert_eq!(*tracker.status().borrow(), SyncStatus::Failed);

        Arc::into_inner(wallet).unwrap().destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn events_through_the_bus() {
        let (mock, bus, wallet) = mock_wallet();
        let wallet = Arc::new(wallet);
        let tracker = Arc::new(SyncTracker::new(&config()));
        let shutdown = NotifyOnce::new();
        let events = bus.subscribe(SYNC_EVENTS);
        let run = tokio::spawn(tracker.clone().run(
            wallet.clone(),
            events,
            shutdown.clone(),
        ));

        let sync = spawn_sync(&tracker, &wallet);
        settle().await;
        let (txo, tx) = latest_ids(&mock);
        let listener = mock.listener().unwrap();
        listener.on_connectivity_status(1);
        listener.on_txo_validation_complete(txo, 0);
        listener.on_tx_validation_complete(tx, 0);

        sync.await.unwrap().unwrap();
        assert_eq!(*tracker.connectivity().borrow(), ConnectivityStatus::Online);

        shutdown.send();
        run.await.unwrap();
        Arc::into_inner(wallet).unwrap().destroy();
    }
}
