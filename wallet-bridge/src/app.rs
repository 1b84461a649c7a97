//! [`WalletApp`] owns the wallet and everything built on top of it, and runs
//! the background tasks which keep the client-side model current.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, anyhow};
use logger::host::HostLogSink;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};
use wallet_tokio::{
    SMALLER_CHANNEL_SIZE,
    notify_once::NotifyOnce,
    task::{self, LxTask},
};

use crate::{
    balance::BalanceCache,
    callbacks::CallbackDispatcher,
    config::BridgeConfig,
    event::{DomainEventBus, EventKind},
    ffi::{engine::NativeEngine, error::UserFacingError},
    repository::TxRepository,
    tx::{Amount, TxId, WalletAddress},
    validation::{SYNC_EVENTS, SyncTracker},
    wallet::Wallet,
};

/// Init the global logger, forwarding formatted lines to the mobile host.
///
/// Env vars don't work well on mobile, so the filter comes from the config.
/// Safe to call again after a host hot restart: the sink is replaced.
pub fn init_logging(sink: impl HostLogSink, config: &BridgeConfig) {
    logger::host::init_host(sink, &config.rust_log);
}

pub struct WalletApp {
    wallet: Arc<Wallet>,
    bus: DomainEventBus,
    repo: Arc<TxRepository>,
    balance: Arc<BalanceCache>,
    sync: Arc<SyncTracker>,
    eph_tasks_tx: mpsc::Sender<LxTask<()>>,
    shutdown: NotifyOnce,
    supervisor: LxTask<()>,
}

impl WalletApp {
    /// Create the wallet, load its current state, and start the background
    /// tasks. Must be called from within a tokio runtime.
    #[instrument(skip_all, name = "(app)")]
    pub async fn start(
        engine: Arc<dyn NativeEngine>,
        config: BridgeConfig,
    ) -> anyhow::Result<Self> {
        config.validate().context("Invalid config")?;

        // Subscribe before the wallet exists so no early callback is missed.
        let bus = DomainEventBus::new(config.event_bus_capacity);
        let tx_events = bus.subscribe(EventKind::TX);
        let balance_events = bus.subscribe(&[EventKind::BalanceUpdated]);
        let sync_events = bus.subscribe(SYNC_EVENTS);

        let dispatcher =
            Arc::new(CallbackDispatcher::new(engine.clone(), bus.clone()));
        let wallet = Wallet::create(engine, &config, dispatcher)
            .context("Failed to create wallet")?;

        let (repo, recompute_rx) =
            TxRepository::new(config.required_confirmations);
        let balance = BalanceCache::new();
        if let Err(e) = Self::load(&wallet, &repo, &balance, &config) {
            wallet.destroy();
            return Err(e);
        }

        let wallet = Arc::new(wallet);
        let repo = Arc::new(repo);
        let balance = Arc::new(balance);
        let sync = Arc::new(SyncTracker::new(&config));
        let shutdown = NotifyOnce::new();

        let static_tasks = vec![
            LxTask::spawn(
                "tx events",
                repo.clone()
                    .run_events(wallet.clone(), tx_events, shutdown.clone()),
            ),
            LxTask::spawn(
                "tx list recompute",
                repo.clone().run_recompute(
                    recompute_rx,
                    config.list_debounce,
                    shutdown.clone(),
                ),
            ),
            LxTask::spawn(
                "balance",
                balance
                    .clone()
                    .run(wallet.clone(), balance_events, shutdown.clone()),
            ),
            LxTask::spawn(
                "sync events",
                sync.clone()
                    .run(wallet.clone(), sync_events, shutdown.clone()),
            ),
            LxTask::spawn(
                "expire pending txs",
                expire_pending_txs(
                    wallet.clone(),
                    config.pending_tx_expiry,
                    config.expiry_check_interval,
                    shutdown.clone(),
                ),
            ),
        ];
        let (eph_tasks_tx, eph_tasks_rx) = mpsc::channel(SMALLER_CHANNEL_SIZE);
        let supervisor = LxTask::spawn(
            "supervisor",
            task::join_tasks_and_shutdown(
                "WalletApp",
                static_tasks,
                eph_tasks_rx,
                shutdown.clone(),
                config.shutdown_timeout,
            ),
        );

        info!("Wallet app started");
        Ok(Self {
            wallet,
            bus,
            repo,
            balance,
            sync,
            eph_tasks_tx,
            shutdown,
            supervisor,
        })
    }

    fn load(
        wallet: &Wallet,
        repo: &TxRepository,
        balance: &BalanceCache,
        config: &BridgeConfig,
    ) -> anyhow::Result<()> {
        repo.set_required_confirmations(wallet, config.required_confirmations)?;
        repo.refresh_all(wallet).context("Initial tx load failed")?;
        balance
            .refresh(wallet)
            .context("Initial balance load failed")?;
        Ok(())
    }

    #[inline]
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// The event bus, for hosts that want raw events (e.g. recovery
    /// progress or direct send results).
    #[inline]
    pub fn events(&self) -> &DomainEventBus {
        &self.bus
    }

    #[inline]
    pub fn repository(&self) -> &TxRepository {
        &self.repo
    }

    #[inline]
    pub fn balance(&self) -> &BalanceCache {
        &self.balance
    }

    #[inline]
    pub fn sync_tracker(&self) -> &SyncTracker {
        &self.sync
    }

    /// Kick off a base-node sync in the background. Progress is observable
    /// through [`SyncTracker::status`].
    pub fn start_base_node_sync(&self) -> anyhow::Result<()> {
        let sync = self.sync.clone();
        let wallet = self.wallet.clone();
        let task = LxTask::spawn("base node sync", async move {
            if let Err(e) = sync.sync(&wallet).await {
                warn!("Base node sync failed: {e:#}");
            }
        });
        self.eph_tasks_tx
            .try_send(task)
            .map_err(|_| anyhow!("App is shutting down"))
    }

    /// Send a tx and add it to the repository right away.
    pub fn send_tx(
        &self,
        destination: &WalletAddress,
        amount: Amount,
        fee_per_gram: Amount,
        message: &str,
    ) -> Result<Option<TxId>, UserFacingError> {
        let sent = self
            .wallet
            .send_tx(destination, amount, fee_per_gram, message)
            .map_err(|e| {
                warn!("Failed to send tx: {e:#}");
                e.user_facing()
            })?;

        // A tx queued during discovery has no id yet, but is already in the
        // engine's pending outbound collection.
        let update = match sent {
            Some(id) => self.repo.on_tx_sent(&self.wallet, id),
            None => self.repo.refresh_all(&self.wallet),
        };
        if let Err(e) = update {
            error!("Sent tx but failed to update txs: {e:#}");
        }
        Ok(sent)
    }

    pub fn set_required_confirmations(&self, count: u64) -> anyhow::Result<()> {
        self.repo.set_required_confirmations(&self.wallet, count)
    }

    /// Stop every background task, then release the wallet.
    #[instrument(skip_all, name = "(app-shutdown)")]
    pub async fn shutdown(self) {
        let Self {
            wallet,
            eph_tasks_tx,
            shutdown,
            supervisor,
            ..
        } = self;

        shutdown.send();
        drop(eph_tasks_tx);
        if let Err(e) = supervisor.await {
            error!("Supervisor task failed: {e:#}");
        }

        match Arc::into_inner(wallet) {
            Some(wallet) => wallet.destroy(),
            None => warn!("Wallet still referenced by a hung task"),
        }
    }
}

/// Periodically cancel pending txs which have been waiting too long.
#[instrument(skip_all, name = "(expiry)")]
async fn expire_pending_txs(
    wallet: Arc<Wallet>,
    expiry: Duration,
    interval: Duration,
    mut shutdown: NotifyOnce,
) {
    let mut timer = tokio::time::interval(interval);
    loop {
        tokio::select! {
            () = shutdown.recv() => break,
            _ = timer.tick() => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                match wallet.cancel_expired_pending_txs(now, expiry) {
                    Ok(cancelled) if !cancelled.is_empty() =>
                        info!(num = cancelled.len(), "Cancelled expired txs"),
                    Ok(_) => (),
                    Err(e) => warn!("Failed to cancel expired txs: {e:#}"),
                }
            }
        }
    }
    info!("Expiry task shutting down");
}
