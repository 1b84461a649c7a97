//! The client-side transaction ledger.
//!
//! [`TxState`] holds the four engine collections keyed by [`TxId`] and moves
//! ids between them as [`DomainEvent`]s arrive, one named transition per
//! event. [`merged_list`] derives the displayable two-section list from it.
//! [`TxRepository`] owns the state, applies events from a [`Subscription`],
//! and publishes the merged list through a `watch` channel, recomputing it at
//! most once per debounce window.
//!
//! A refresh reads the engine without holding the state lock. Changes applied
//! meanwhile are journaled and replayed onto the refreshed state before it is
//! installed, so they aren't rolled back by a read that predates them.

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};
use wallet_tokio::{notify, notify_once::NotifyOnce};

use crate::{
    event::{DomainEvent, Subscription},
    tx::{
        CancelledTx, CompletedTx, PendingInboundTx, PendingOutboundTx, Tx,
        TxId, TxStatus,
    },
    wallet::Wallet,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, strum::Display)]
pub enum Section {
    Pending,
    Settled,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TxListItem {
    Header(Section),
    Tx(Tx),
}

/// Why an event didn't change the state.
#[derive(Copy, Clone, Debug, Eq, PartialEq, strum::Display)]
pub enum Anomaly {
    /// The id is already known.
    Duplicate,
    /// The id isn't where the event expects it, nor anywhere else.
    Missing,
    /// The id has already moved past the state the event expects.
    OutOfOrder,
    /// The event isn't about transaction state.
    NotTxEvent,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Applied,
    Ignored(Anomaly),
}

/// Every known tx, each id in exactly one collection.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TxState {
    pending_inbound: BTreeMap<TxId, PendingInboundTx>,
    pending_outbound: BTreeMap<TxId, PendingOutboundTx>,
    completed: BTreeMap<TxId, CompletedTx>,
    cancelled: BTreeMap<TxId, CancelledTx>,
}

impl TxState {
    /// Build the state from wholesale engine reads. An id found in more than
    /// one collection is kept in the most advanced one, with precedence
    /// cancelled > completed > pending. Returns the number of such conflicts.
    pub fn from_collections(
        pending_inbound: Vec<PendingInboundTx>,
        pending_outbound: Vec<PendingOutboundTx>,
        completed: Vec<CompletedTx>,
        cancelled: Vec<CancelledTx>,
    ) -> (Self, usize) {
        let mut state = Self::default();
        let mut conflicts = 0;

        for tx in cancelled {
            if state.cancelled.insert(tx.tx.id, tx).is_some() {
                conflicts += 1;
            }
        }
        for tx in completed {
            if state.contains(tx.id) {
                conflicts += 1;
            } else {
                state.completed.insert(tx.id, tx);
            }
        }
        for tx in pending_inbound {
            if state.contains(tx.id) {
                conflicts += 1;
            } else {
                state.pending_inbound.insert(tx.id, tx);
            }
        }
        for tx in pending_outbound {
            if state.contains(tx.id) {
                conflicts += 1;
            } else {
                state.pending_outbound.insert(tx.id, tx);
            }
        }

        (state, conflicts)
    }

    pub fn contains(&self, id: TxId) -> bool {
        self.pending_inbound.contains_key(&id)
            || self.pending_outbound.contains_key(&id)
            || self.completed.contains_key(&id)
            || self.cancelled.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending_inbound.len()
            + self.pending_outbound.len()
            + self.completed.len()
            + self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply one event. Never fails; an event which doesn't fit the current
    /// state is reported as [`Outcome::Ignored`] and leaves it unchanged.
    pub fn apply(&mut self, event: &DomainEvent) -> Outcome {
        match event {
            DomainEvent::TxReceived(tx) => self.received(tx),
            DomainEvent::TxReplyReceived { id, status } =>
                self.reply_received(*id, *status),
            DomainEvent::TxFinalized { id, status } =>
                self.finalized(*id, *status),
            DomainEvent::InboundTxBroadcast(id) => self.inbound_broadcast(*id),
            DomainEvent::OutboundTxBroadcast(id) =>
                self.outbound_broadcast(*id),
            DomainEvent::TxMinedUnconfirmed { tx, confirmations }
            | DomainEvent::TxFauxUnconfirmed { tx, confirmations } =>
                self.mined(tx, Some(*confirmations)),
            DomainEvent::TxMined(tx) | DomainEvent::TxFauxConfirmed(tx) =>
                self.mined(tx, None),
            DomainEvent::TxCancelled(tx) => self.cancelled(tx),
            DomainEvent::DirectSendResult { .. }
            | DomainEvent::BalanceUpdated(_)
            | DomainEvent::ValidationComplete { .. }
            | DomainEvent::ConnectivityChanged(_)
            | DomainEvent::RecoveryProgress(_) =>
                Outcome::Ignored(Anomaly::NotTxEvent),
        }
    }

    fn apply_change(&mut self, change: &Change) -> Outcome {
        match change {
            Change::Event(event) => self.apply(event),
            Change::Sent(tx) => self.sent(tx.clone()),
        }
    }

    /// Insert a tx we just sent.
    pub fn sent(&mut self, tx: PendingOutboundTx) -> Outcome {
        if self.contains(tx.id) {
            return Outcome::Ignored(Anomaly::Duplicate);
        }
        self.pending_outbound.insert(tx.id, tx);
        Outcome::Applied
    }

    // --- Transitions --- //

    fn received(&mut self, tx: &PendingInboundTx) -> Outcome {
        if self.contains(tx.id) {
            return Outcome::Ignored(Anomaly::Duplicate);
        }
        self.pending_inbound.insert(tx.id, tx.clone());
        Outcome::Applied
    }

    fn reply_received(&mut self, id: TxId, status: TxStatus) -> Outcome {
        match self.pending_outbound.get_mut(&id) {
            Some(tx) => {
                tx.status = status;
                Outcome::Applied
            }
            None => self.not_pending(id),
        }
    }

    fn finalized(&mut self, id: TxId, status: TxStatus) -> Outcome {
        match self.pending_inbound.get_mut(&id) {
            Some(tx) => {
                tx.status = status;
                Outcome::Applied
            }
            None => self.not_pending(id),
        }
    }

    fn inbound_broadcast(&mut self, id: TxId) -> Outcome {
        match self.pending_inbound.get_mut(&id) {
            Some(tx) => {
                tx.status = TxStatus::Broadcast;
                Outcome::Applied
            }
            None => self.not_pending(id),
        }
    }

    fn outbound_broadcast(&mut self, id: TxId) -> Outcome {
        match self.pending_outbound.get_mut(&id) {
            Some(tx) => {
                tx.status = TxStatus::Broadcast;
                Outcome::Applied
            }
            None => self.not_pending(id),
        }
    }

    /// `confirmations` is `Some` for the unconfirmed variants.
    fn mined(&mut self, tx: &CompletedTx, confirmations: Option<u64>) -> Outcome {
        if self.cancelled.contains_key(&tx.id) {
            return Outcome::Ignored(Anomaly::OutOfOrder);
        }
        let already_confirmed = self
            .completed
            .get(&tx.id)
            .is_some_and(|known| known.status.is_confirmed());
        if confirmations.is_some() && already_confirmed {
            return Outcome::Ignored(Anomaly::OutOfOrder);
        }

        self.pending_inbound.remove(&tx.id);
        self.pending_outbound.remove(&tx.id);
        let mut tx = tx.clone();
        if let Some(confirmations) = confirmations {
            tx.confirmations = confirmations;
        }
        self.completed.insert(tx.id, tx);
        Outcome::Applied
    }

    fn cancelled(&mut self, tx: &CancelledTx) -> Outcome {
        let id = tx.tx.id;
        self.pending_inbound.remove(&id);
        self.pending_outbound.remove(&id);
        self.completed.remove(&id);
        self.cancelled.insert(id, tx.clone());
        Outcome::Applied
    }

    fn not_pending(&self, id: TxId) -> Outcome {
        if self.completed.contains_key(&id) || self.cancelled.contains_key(&id)
        {
            Outcome::Ignored(Anomaly::OutOfOrder)
        } else {
            Outcome::Ignored(Anomaly::Missing)
        }
    }

    /// Check the integrity of the state.
    #[cfg(test)]
    fn debug_assert_invariants(&self) {
        if cfg!(not(debug_assertions)) {
            return;
        }

        // Each tx is stored under its own id
        assert!(self.pending_inbound.iter().all(|(id, tx)| *id == tx.id));
        assert!(self.pending_outbound.iter().all(|(id, tx)| *id == tx.id));
        assert!(self.completed.iter().all(|(id, tx)| *id == tx.id));
        assert!(self.cancelled.iter().all(|(id, tx)| *id == tx.tx.id));

        // No id is in two collections
        let mut ids = self
            .pending_inbound
            .keys()
            .chain(self.pending_outbound.keys())
            .chain(self.completed.keys())
            .chain(self.cancelled.keys())
            .collect::<Vec<_>>();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), self.len());
    }
}

/// Derive the displayable list: pending txs (including mined-unconfirmed
/// ones) then settled txs, each section newest first and preceded by its
/// header. Empty sections are left out entirely.
pub fn merged_list(state: &TxState) -> Vec<TxListItem> {
    let mut pending = Vec::new();
    let mut settled = Vec::new();

    pending.extend(state.pending_inbound.values().cloned().map(Tx::PendingInbound));
    pending.extend(
        state
            .pending_outbound
            .values()
            .cloned()
            .map(Tx::PendingOutbound),
    );
    for tx in state.completed.values() {
        if tx.status == TxStatus::MinedUnconfirmed {
            pending.push(Tx::Completed(tx.clone()));
        } else {
            settled.push(Tx::Completed(tx.clone()));
        }
    }
    settled.extend(state.cancelled.values().cloned().map(Tx::Cancelled));

    let newest_first =
        |a: &Tx, b: &Tx| (b.timestamp(), b.id()).cmp(&(a.timestamp(), a.id()));
    pending.sort_by(newest_first);
    settled.sort_by(newest_first);

    let mut list = Vec::with_capacity(pending.len() + settled.len() + 2);
    for (section, txs) in [(Section::Pending, pending), (Section::Settled, settled)]
    {
        if txs.is_empty() {
            continue;
        }
        list.push(TxListItem::Header(section));
        list.extend(txs.into_iter().map(TxListItem::Tx));
    }
    list
}

/// A change to the state made outside of a refresh.
#[derive(Debug)]
enum Change {
    Event(DomainEvent),
    Sent(PendingOutboundTx),
}

/// The state plus what's needed to keep it consistent across refreshes.
#[derive(Default)]
struct Ledger {
    state: TxState,
    /// Changes applied while any refresh is in flight, by sequence number.
    journal: Vec<(u64, Change)>,
    seq: u64,
    refreshes: usize,
}

impl Ledger {
    fn apply(&mut self, change: Change) -> Outcome {
        let outcome = self.state.apply_change(&change);
        if self.refreshes > 0 && outcome != Outcome::Ignored(Anomaly::NotTxEvent)
        {
            self.seq += 1;
            self.journal.push((self.seq, change));
        }
        outcome
    }

    /// Returns the sequence number the refresh starts after.
    fn start_refresh(&mut self) -> u64 {
        self.refreshes += 1;
        self.seq
    }

    /// Install a refreshed state with every change since `start` replayed on
    /// top. Returns the number of replayed changes.
    fn finish_refresh(&mut self, start: u64, state: Option<TxState>) -> usize {
        self.refreshes -= 1;
        let mut replayed = 0;
        if let Some(mut state) = state {
            for (_, change) in self.journal.iter().filter(|(seq, _)| *seq > start)
            {
                state.apply_change(change);
                replayed += 1;
            }
            self.state = state;
        }
        if self.refreshes == 0 {
            self.journal.clear();
        }
        replayed
    }
}

pub struct TxRepository {
    ledger: Mutex<Ledger>,
    list_tx: watch::Sender<Arc<Vec<TxListItem>>>,
    confirmations_tx: watch::Sender<u64>,
    recompute_tx: notify::Sender,
    num_recomputes: AtomicUsize,
}

impl TxRepository {
    /// The returned receiver drives [`run_recompute`](Self::run_recompute).
    pub fn new(required_confirmations: u64) -> (Self, notify::Receiver) {
        let (recompute_tx, recompute_rx) = notify::channel();
        let repo = Self {
            ledger: Mutex::new(Ledger::default()),
            list_tx: watch::Sender::new(Arc::new(Vec::new())),
            confirmations_tx: watch::Sender::new(required_confirmations),
            recompute_tx,
            num_recomputes: AtomicUsize::new(0),
        };
        (repo, recompute_rx)
    }

    /// The merged list, updated after each recompute.
    pub fn list(&self) -> watch::Receiver<Arc<Vec<TxListItem>>> {
        self.list_tx.subscribe()
    }

    pub fn current_list(&self) -> Arc<Vec<TxListItem>> {
        self.list_tx.borrow().clone()
    }

    pub fn required_confirmation_count(&self) -> watch::Receiver<u64> {
        self.confirmations_tx.subscribe()
    }

    pub fn num_recomputes(&self) -> usize {
        self.num_recomputes.load(Ordering::Relaxed)
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> TxState {
        self.ledger.lock().unwrap().state.clone()
    }

    /// Apply `event` and schedule a recompute if anything changed.
    pub fn handle_event(&self, event: &DomainEvent) -> Outcome {
        let change = Change::Event(event.clone());
        let outcome = self.ledger.lock().unwrap().apply(change);
        match outcome {
            Outcome::Applied => self.recompute_tx.send(),
            Outcome::Ignored(Anomaly::NotTxEvent) => (),
            Outcome::Ignored(anomaly) => warn!(
                kind = %event.kind(),
                id = ?event.tx_id(),
                "Ignoring tx event: {anomaly}",
            ),
        }
        outcome
    }

    /// Rebuild the state from the engine's collections and recompute the
    /// list right away.
    #[instrument(skip_all, name = "(refresh-txs)")]
    pub fn refresh_all(&self, wallet: &Wallet) -> anyhow::Result<()> {
        let start = self.ledger.lock().unwrap().start_refresh();
        let read = read_collections(wallet);

        let mut ledger = self.ledger.lock().unwrap();
        let (state, conflicts) = match read {
            Ok(read) => read,
            Err(e) => {
                ledger.finish_refresh(start, None);
                return Err(e);
            }
        };
        let replayed = ledger.finish_refresh(start, Some(state));
        let num_txs = ledger.state.len();
        drop(ledger);

        if conflicts > 0 {
            warn!(%conflicts, "Engine returned txs in more than one collection");
        }
        if replayed > 0 {
            debug!(%replayed, "Replayed changes made during refresh");
        }
        self.recompute();
        info!(%num_txs, "Refreshed txs");

        self.refresh_required_confirmations(wallet)?;
        Ok(())
    }

    /// Insert a tx we just sent, without waiting for an engine event.
    pub fn on_tx_sent(&self, wallet: &Wallet, id: TxId) -> anyhow::Result<()> {
        match wallet.pending_outbound_tx_by_id(id) {
            Ok(tx) => {
                let outcome =
                    self.ledger.lock().unwrap().apply(Change::Sent(tx));
                if outcome == Outcome::Applied {
                    self.recompute_tx.send();
                } else {
                    debug!(%id, "Sent tx already known");
                }
                Ok(())
            }
            Err(e) => {
                warn!(%id, "Failed to read sent tx: {e:#}; refreshing all");
                self.refresh_all(wallet)
            }
        }
    }

    pub fn refresh_required_confirmations(
        &self,
        wallet: &Wallet,
    ) -> anyhow::Result<u64> {
        let count = wallet
            .required_confirmations()
            .context("Failed to read required confirmations")?;
        self.confirmations_tx.send_replace(count);
        Ok(count)
    }

    pub fn set_required_confirmations(
        &self,
        wallet: &Wallet,
        count: u64,
    ) -> anyhow::Result<()> {
        wallet
            .set_required_confirmations(count)
            .context("Failed to set required confirmations")?;
        self.confirmations_tx.send_replace(count);
        Ok(())
    }

    fn recompute(&self) {
        let list = merged_list(&self.ledger.lock().unwrap().state);
        self.list_tx.send_replace(Arc::new(list));
        self.num_recomputes.fetch_add(1, Ordering::Relaxed);
    }

    /// Recompute the list at most once per `debounce` window until shutdown.
    #[instrument(skip_all, name = "(recompute)")]
    pub async fn run_recompute(
        self: Arc<Self>,
        mut recompute_rx: notify::Receiver,
        debounce: Duration,
        mut shutdown: NotifyOnce,
    ) {
        loop {
            tokio::select! {
                () = recompute_rx.recv_debounced(debounce) => self.recompute(),
                () = shutdown.recv() => break,
            }
        }
        info!("Recompute task shutting down");
    }

    /// Apply tx events until shutdown. If the subscription lags, the state
    /// is rebuilt from the engine instead.
    #[instrument(skip_all, name = "(repo)")]
    pub async fn run_events(
        self: Arc<Self>,
        wallet: Arc<Wallet>,
        mut events: Subscription,
        mut shutdown: NotifyOnce,
    ) {
        loop {
            tokio::select! {
                () = shutdown.recv() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        self.handle_event(&event);
                    }
                    Err(e) => {
                        warn!("{e:#}; refreshing all txs");
                        if let Err(e) = self.refresh_all(&wallet) {
                            error!("Failed to refresh txs: {e:#}");
                        }
                    }
                },
            }
        }
        info!("Repo task shutting down");
    }
}

/// Read all four collections from the engine, resolving conflicts.
fn read_collections(wallet: &Wallet) -> anyhow::Result<(TxState, usize)> {
    let pending_inbound = wallet
        .pending_inbound_txs()
        .context("Failed to read pending inbound txs")?;
    let pending_outbound = wallet
        .pending_outbound_txs()
        .context("Failed to read pending outbound txs")?;
    let completed =
        wallet.completed_txs().context("Failed to read completed txs")?;
    let cancelled =
        wallet.cancelled_txs().context("Failed to read cancelled txs")?;

    Ok(TxState::from_collections(
        pending_inbound,
        pending_outbound,
        completed,
        cancelled,
    ))
}

#[cfg(test)]
mod test {
    use proptest::{
        collection::vec,
        prop_assert, prop_oneof, proptest,
        strategy::{Just, Strategy},
        test_runner::Config,
    };
    use wallet_tokio::task::LxTask;

    use super::*;
    use crate::{
        event::{DomainEventBus, EventKind},
        ffi::mock::MockEngine,
        tx::{Amount, CancellationReason, TxDirection},
        wallet::test_utils::{mock_wallet, other_address},
    };

    fn received(id: u128, timestamp: u64) -> DomainEvent {
        DomainEvent::TxReceived(MockEngine::pending_inbound_tx(id, timestamp))
    }

    fn mined(id: u128, timestamp: u64, status: TxStatus) -> CompletedTx {
        CompletedTx {
            status,
            ..MockEngine::completed_tx(id, timestamp, false)
        }
    }

    fn cancelled(id: u128, timestamp: u64) -> DomainEvent {
        DomainEvent::TxCancelled(CancelledTx {
            tx: MockEngine::completed_tx(id, timestamp, true),
            reason: CancellationReason::Timeout,
        })
    }

    fn ids_in(list: &[TxListItem], section: Section) -> Vec<u128> {
        let mut current = None;
        let mut ids = Vec::new();
        for item in list {
            match item {
                TxListItem::Header(s) => current = Some(*s),
                TxListItem::Tx(tx) if current == Some(section) =>
                    ids.push(tx.id().0),
                TxListItem::Tx(_) => (),
            }
        }
        ids
    }

    fn any_tx_event() -> impl Strategy<Value = DomainEvent> {
        let id = 0u128..6;
        let ts = 0u64..4;
        let status = prop_oneof![
            Just(TxStatus::Completed),
            Just(TxStatus::Pending),
            Just(TxStatus::Broadcast),
        ];
        prop_oneof![
            (id.clone(), ts.clone()).prop_map(|(id, ts)| received(id, ts)),
            (id.clone(), status.clone()).prop_map(|(id, status)| {
                DomainEvent::TxReplyReceived { id: TxId(id), status }
            }),
            (id.clone(), status).prop_map(|(id, status)| {
                DomainEvent::TxFinalized { id: TxId(id), status }
            }),
            id.clone().prop_map(|id| DomainEvent::InboundTxBroadcast(TxId(id))),
            id.clone().prop_map(|id| DomainEvent::OutboundTxBroadcast(TxId(id))),
            (id.clone(), ts.clone(), 0u64..3).prop_map(|(id, ts, n)| {
                DomainEvent::TxMinedUnconfirmed {
                    tx: mined(id, ts, TxStatus::MinedUnconfirmed),
                    confirmations: n,
                }
            }),
            (id.clone(), ts.clone()).prop_map(|(id, ts)| {
                DomainEvent::TxMined(mined(id, ts, TxStatus::MinedConfirmed))
            }),
            (id.clone(), ts.clone(), 0u64..3).prop_map(|(id, ts, n)| {
                DomainEvent::TxFauxUnconfirmed {
                    tx: mined(id, ts, TxStatus::FauxUnconfirmed),
                    confirmations: n,
                }
            }),
            (id.clone(), ts.clone()).prop_map(|(id, ts)| {
                DomainEvent::TxFauxConfirmed(mined(id, ts, TxStatus::FauxConfirmed))
            }),
            (id, ts).prop_map(|(id, ts)| cancelled(id, ts)),
            Just(DomainEvent::InboundTxBroadcast(TxId(99))),
        ]
    }

    #[test]
    fn any_event_sequence_keeps_invariants() {
        proptest!(
            Config::with_cases(256),
            |(events in vec(any_tx_event(), 0..40))| {
                let mut state = TxState::default();
                for event in &events {
                    let before = state.clone();
                    if let Outcome::Ignored(_) = state.apply(event) {
                        prop_assert!(state == before);
                    }
                    state.debug_assert_invariants();

                    // A cancelled tx never comes back
                    if let Some(id) = event.tx_id()
                        && before.cancelled.contains_key(&id)
                    {
                        prop_assert!(state.cancelled.contains_key(&id));
                    }
                }

                let list = merged_list(&state);
                let num_txs = list
                    .iter()
                    .filter(|item| matches!(item, TxListItem::Tx(_)))
                    .count();
                prop_assert!(num_txs == state.len());

                // Only mined-unconfirmed completed txs join the pending ones
                let mut expected_pending = state
                    .pending_inbound
                    .keys()
                    .chain(state.pending_outbound.keys())
                    .chain(state.completed.values().filter_map(|tx| {
                        (tx.status == TxStatus::MinedUnconfirmed).then_some(&tx.id)
                    }))
                    .map(|id| id.0)
                    .collect::<Vec<_>>();
                expected_pending.sort_unstable();
                let mut pending = ids_in(&list, Section::Pending);
                pending.sort_unstable();
                prop_assert!(pending == expected_pending);

                // Pending section comes first, each section newest first
                let headers = list
                    .iter()
                    .filter_map(|item| match item {
                        TxListItem::Header(s) => Some(*s),
                        TxListItem::Tx(_) => None,
                    })
                    .collect::<Vec<_>>();
                prop_assert!(
                    headers.is_empty()
                        || headers == [Section::Pending]
                        || headers == [Section::Settled]
                        || headers == [Section::Pending, Section::Settled]
                );
                let mut prev: Option<(Section, (u64, TxId))> = None;
                let mut section = None;
                for item in &list {
                    match item {
                        TxListItem::Header(s) => section = Some(*s),
                        TxListItem::Tx(tx) => {
                            let section = section.unwrap();
                            let key = (tx.timestamp(), tx.id());
                            if let Some((prev_section, prev_key)) = prev
                                && prev_section == section
                            {
                                prop_assert!(prev_key > key);
                            }
                            prev = Some((section, key));
                        }
                    }
                }
            }
        );
    }

    #[test]
    fn received_then_mined() {
        let mut state = TxState::default();
        assert_eq!(state.apply(&received(7, 1000)), Outcome::Applied);
        assert_eq!(ids_in(&merged_list(&state), Section::Pending), [7]);

        let tx = CompletedTx {
            direction: TxDirection::Inbound,
            ..mined(7, 1000, TxStatus::MinedConfirmed)
        };
        assert_eq!(state.apply(&DomainEvent::TxMined(tx)), Outcome::Applied);

        let list = merged_list(&state);
        assert!(ids_in(&list, Section::Pending).is_empty());
        assert_eq!(ids_in(&list, Section::Settled), [7]);
        assert_eq!(list[0], TxListItem::Header(Section::Settled));
        match &list[1] {
            TxListItem::Tx(tx) => assert_eq!(tx.status(), TxStatus::MinedConfirmed),
            other => panic!("Expected a tx, got {other:?}"),
        }
    }

    #[test]
    fn cancel_for_unseen_id() {
        let mut state = TxState::default();
        assert_eq!(state.apply(&cancelled(9, 5)), Outcome::Applied);
        let list = merged_list(&state);
        assert_eq!(ids_in(&list, Section::Settled), [9]);
        assert!(matches!(&list[1], TxListItem::Tx(Tx::Cancelled(tx))
            if tx.reason == CancellationReason::Timeout));
    }

    #[test]
    fn mined_before_received() {
        let mut state = TxState::default();
        let tx = mined(4, 10, TxStatus::MinedConfirmed);
        assert_eq!(state.apply(&DomainEvent::TxMined(tx)), Outcome::Applied);
        assert_eq!(
            state.apply(&received(4, 10)),
            Outcome::Ignored(Anomaly::Duplicate)
        );
        assert_eq!(ids_in(&merged_list(&state), Section::Settled), [4]);
        assert!(state.pending_inbound.is_empty());
    }

    #[test]
    fn mined_replaces_in_place() {
        let mut state = TxState::default();
        let unconfirmed = DomainEvent::TxMinedUnconfirmed {
            tx: mined(3, 10, TxStatus::MinedUnconfirmed),
            confirmations: 1,
        };
        state.apply(&received(3, 10));
        state.apply(&unconfirmed);
        assert_eq!(ids_in(&merged_list(&state), Section::Pending), [3]);
        assert_eq!(state.completed[&TxId(3)].confirmations, 1);

        let confirmed = mined(3, 10, TxStatus::MinedConfirmed);
        state.apply(&DomainEvent::TxMined(confirmed.clone()));
        state.apply(&DomainEvent::TxMined(confirmed.clone()));
        assert_eq!(state.len(), 1);
        assert_eq!(state.completed[&TxId(3)], confirmed);

        // A late unconfirmed event doesn't demote it
        assert_eq!(state.apply(&unconfirmed), Outcome::Ignored(Anomaly::OutOfOrder));
        assert_eq!(ids_in(&merged_list(&state), Section::Settled), [3]);
    }

    #[test]
    fn missing_and_out_of_order() {
        let mut state = TxState::default();
        let reply = DomainEvent::TxReplyReceived {
            id: TxId(1),
            status: TxStatus::Completed,
        };
        assert_eq!(state.apply(&reply), Outcome::Ignored(Anomaly::Missing));

        state.apply(&cancelled(1, 0));
        assert_eq!(state.apply(&reply), Outcome::Ignored(Anomaly::OutOfOrder));
        let tx = mined(1, 0, TxStatus::MinedConfirmed);
        assert_eq!(
            state.apply(&DomainEvent::TxMined(tx)),
            Outcome::Ignored(Anomaly::OutOfOrder)
        );
        assert_eq!(
            state.apply(&DomainEvent::ConnectivityChanged(Default::default())),
            Outcome::Ignored(Anomaly::NotTxEvent)
        );
    }

    #[test]
    fn faux_unconfirmed_is_settled() {
        let mut state = TxState::default();
        state.apply(&received(11, 10));
        let faux = DomainEvent::TxFauxUnconfirmed {
            tx: mined(11, 10, TxStatus::FauxUnconfirmed),
            confirmations: 1,
        };
        assert_eq!(state.apply(&faux), Outcome::Applied);

        let list = merged_list(&state);
        assert_eq!(list[0], TxListItem::Header(Section::Settled));
        assert!(ids_in(&list, Section::Pending).is_empty());
        assert_eq!(ids_in(&list, Section::Settled), [11]);
    }

    #[test]
    fn merged_list_sections() {
        assert!(merged_list(&TxState::default()).is_empty());

        let mut state = TxState::default();
        state.apply(&received(1, 100));
        state.apply(&received(2, 100));
        state.apply(&received(3, 300));
        state.apply(&DomainEvent::TxMined(mined(4, 200, TxStatus::MinedConfirmed)));
        state.apply(&cancelled(5, 400));

        let list = merged_list(&state);
        assert_eq!(list[0], TxListItem::Header(Section::Pending));
        assert_eq!(ids_in(&list, Section::Pending), [3, 2, 1]);
        assert_eq!(list[4], TxListItem::Header(Section::Settled));
        assert_eq!(ids_in(&list, Section::Settled), [5, 4]);
    }

    #[test]
    fn from_collections_precedence() {
        let cancelled = CancelledTx {
            tx: MockEngine::completed_tx(1, 0, true),
            reason: CancellationReason::Orphan,
        };
        let (state, conflicts) = TxState::from_collections(
            vec![MockEngine::pending_inbound_tx(2, 0)],
            vec![
                MockEngine::pending_outbound_tx(1, 0),
                MockEngine::pending_outbound_tx(3, 0),
            ],
            vec![
                MockEngine::completed_tx(1, 0, true),
                MockEngine::completed_tx(2, 0, false),
            ],
            vec![cancelled.clone()],
        );
        state.debug_assert_invariants();
        assert_eq!(conflicts, 3);
        assert_eq!(state.cancelled[&TxId(1)], cancelled);
        assert!(state.completed.contains_key(&TxId(2)));
        assert!(state.pending_outbound.contains_key(&TxId(3)));
        assert_eq!(state.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_events_recomputes_once() {
        let (repo, recompute_rx) = TxRepository::new(3);
        let repo = Arc::new(repo);
        let shutdown = NotifyOnce::new();
        let task = LxTask::spawn(
            "recompute",
            repo.clone().run_recompute(
                recompute_rx,
                Duration::from_millis(500),
                shutdown.clone(),
            ),
        );

        for id in 0..10 {
            repo.handle_event(&received(id, id as u64));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(repo.num_recomputes(), 1);
        assert_eq!(ids_in(&repo.current_list(), Section::Pending).len(), 10);

        // Ignored events don't trigger anything
        repo.handle_event(&received(3, 3));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(repo.num_recomputes(), 1);

        shutdown.send();
        task.await.unwrap();
    }

    #[test]
    fn refresh_all_and_on_tx_sent() {
        let (mock, _bus, wallet) = mock_wallet();
        mock.with_wallet(|w| {
            w.pending_inbound.insert(1, MockEngine::pending_inbound_tx(1, 10));
            // Also completed: completed wins
            w.pending_inbound.insert(2, MockEngine::pending_inbound_tx(2, 20));
            w.completed.insert(2, MockEngine::completed_tx(2, 20, false));
            w.required_confirmations = 6;
        });
        let (repo, _rx) = TxRepository::new(3);
        let confirmations = repo.required_confirmation_count();

        repo.refresh_all(&wallet).unwrap();
        let list = repo.current_list();
        assert_eq!(ids_in(&list, Section::Pending), [1]);
        assert_eq!(ids_in(&list, Section::Settled), [2]);
        assert_eq!(*confirmations.borrow(), 6);

        let id = wallet
            .send_tx(&other_address(2), Amount(10), Amount(100), "")
            .unwrap()
            .unwrap();
        repo.on_tx_sent(&wallet, id).unwrap();
        assert!(repo.snapshot().contains(id));

        // If the sent tx can't be read, everything gets re-pulled instead
        let id = wallet
            .send_tx(&other_address(2), Amount(10), Amount(100), "")
            .unwrap()
            .unwrap();
        mock.fail_call("wallet_get_tx_by_id", 1);
        repo.on_tx_sent(&wallet, id).unwrap();
        assert!(repo.snapshot().contains(id));
        assert!(ids_in(&repo.current_list(), Section::Pending).contains(&id.0));

        repo.set_required_confirmations(&wallet, 2).unwrap();
        assert_eq!(*confirmations.borrow(), 2);
        assert_eq!(mock.live_handles(), 0);
        wallet.destroy();
    }

    #[test]
    fn changes_during_refresh_survive_it() {
        let (mock, _bus, wallet) = mock_wallet();
        mock.with_wallet(|w| {
            w.pending_outbound.insert(5, MockEngine::pending_outbound_tx(5, 10));
        });
        let (repo, _rx) = TxRepository::new(3);
        let repo = Arc::new(repo);
        repo.refresh_all(&wallet).unwrap();
        assert!(repo.snapshot().pending_outbound.contains_key(&TxId(5)));

        // Tx 5 is mined and tx 6 is sent after the refresh read the pending
        // and completed collections, but before it installs its result.
        let hook_repo = repo.clone();
        let sent = MockEngine::pending_outbound_tx(6, 20);
        mock.run_before_call("wallet_get_txs", 3, move || {
            let tx = mined(5, 10, TxStatus::MinedConfirmed);
            hook_repo.handle_event(&DomainEvent::TxMined(tx));
            let mut ledger = hook_repo.ledger.lock().unwrap();
            ledger.apply(Change::Sent(sent));
        });
        repo.refresh_all(&wallet).unwrap();

        let state = repo.snapshot();
        state.debug_assert_invariants();
        assert!(state.completed.contains_key(&TxId(5)));
        assert!(!state.pending_outbound.contains_key(&TxId(5)));
        assert!(state.pending_outbound.contains_key(&TxId(6)));
        let list = repo.current_list();
        assert_eq!(ids_in(&list, Section::Pending), [6]);
        assert_eq!(ids_in(&list, Section::Settled), [5]);

        // The journal is only kept while a refresh is in flight
        assert!(repo.ledger.lock().unwrap().journal.is_empty());

        // A failed refresh leaves the state as is
        mock.fail_call("wallet_get_txs", 1);
        assert!(repo.refresh_all(&wallet).is_err());
        assert_eq!(repo.snapshot(), state);
        assert_eq!(repo.ledger.lock().unwrap().refreshes, 0);
        mock.clear_failures();

        assert_eq!(mock.live_handles(), 0);
        wallet.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn events_from_engine_callbacks() {
        let (mock, bus, wallet) = mock_wallet();
        let wallet = Arc::new(wallet);
        let (repo, _rx) = TxRepository::new(3);
        let repo = Arc::new(repo);
        let shutdown = NotifyOnce::new();
        let events = bus.subscribe(EventKind::TX);
        let task = LxTask::spawn(
            "repo",
            repo.clone()
                .run_events(wallet.clone(), events, shutdown.clone()),
        );

        let listener = mock.listener().unwrap();
        let handle =
            mock.alloc_pending_inbound_tx(MockEngine::pending_inbound_tx(8, 50));
        listener.on_tx_received(handle);
        let handle = mock.alloc_completed_tx(mined(8, 50, TxStatus::MinedConfirmed));
        listener.on_tx_mined(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let state = repo.snapshot();
        assert!(state.completed.contains_key(&TxId(8)));
        assert!(state.pending_inbound.is_empty());

        shutdown.send();
        task.await.unwrap();
        assert_eq!(mock.live_handles(), 0);
        Arc::into_inner(wallet).unwrap().destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn lagged_subscription_refreshes_from_engine() {
        let (mock, _bus, wallet) = mock_wallet();
        let wallet = Arc::new(wallet);
        let (repo, _rx) = TxRepository::new(3);
        let repo = Arc::new(repo);
        let shutdown = NotifyOnce::new();
        let bus = DomainEventBus::new(2);
        let events = bus.subscribe(EventKind::TX);

        mock.with_wallet(|w| {
            w.completed.insert(1, MockEngine::completed_tx(1, 5, true));
        });
        for id in 10..15 {
            bus.publish(received(id, 0));
        }

        let task = LxTask::spawn(
            "repo",
            repo.clone()
                .run_events(wallet.clone(), events, shutdown.clone()),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The refresh picked up the engine's tx; the two buffered events
        // were applied on top
        let state = repo.snapshot();
        assert!(state.completed.contains_key(&TxId(1)));
        assert!(state.pending_inbound.contains_key(&TxId(13)));
        assert!(state.pending_inbound.contains_key(&TxId(14)));

        shutdown.send();
        task.await.unwrap();
        Arc::into_inner(wallet).unwrap().destroy();
    }
}
