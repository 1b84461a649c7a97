//! Domain events and the typed bus they're published on.
//!
//! Events are built only by the [`CallbackDispatcher`], hold copies of engine
//! data, and are immutable once published. Subscribers register for a set of
//! [`EventKind`]s and only see matching events.
//!
//! [`CallbackDispatcher`]: crate::callbacks::CallbackDispatcher

#[cfg(any(test, feature = "test-utils"))]
use proptest_derive::Arbitrary;
use strum::EnumDiscriminants;
use wallet_tokio::events_bus::{EventsBus, EventsRx, Lagged};

use crate::{
    balance::Balance,
    tx::{Amount, CancelledTx, CompletedTx, PendingInboundTx, TxId, TxStatus},
};

#[derive(Clone, Debug, Eq, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(EventKind))]
#[strum_discriminants(derive(Hash, strum::Display))]
pub enum DomainEvent {
    TxReceived(PendingInboundTx),
    TxReplyReceived { id: TxId, status: TxStatus },
    TxFinalized { id: TxId, status: TxStatus },
    InboundTxBroadcast(TxId),
    OutboundTxBroadcast(TxId),
    TxMinedUnconfirmed { tx: CompletedTx, confirmations: u64 },
    TxMined(CompletedTx),
    TxFauxUnconfirmed { tx: CompletedTx, confirmations: u64 },
    TxFauxConfirmed(CompletedTx),
    TxCancelled(CancelledTx),
    DirectSendResult { id: TxId, status: SendStatus },
    BalanceUpdated(Balance),
    ValidationComplete {
        request_id: u64,
        kind: ValidationKind,
        success: bool,
    },
    ConnectivityChanged(ConnectivityStatus),
    RecoveryProgress(RecoveryEvent),
}

/// How a direct send went out.
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SendStatus {
    Queued,
    DirectSendSafSend,
    DirectSend,
    SafSend,
    Invalid,
}

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, strum::Display)]
pub enum ValidationKind {
    Txo,
    Tx,
}

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, strum::Display)]
pub enum ConnectivityStatus {
    #[default]
    Connecting,
    Online,
    Offline,
}

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecoveryEvent {
    ConnectingToBaseNode,
    ConnectedToBaseNode,
    ConnectionToBaseNodeFailed { retry_count: u64, retry_limit: u64 },
    Progress { current_block: u64, total_blocks: u64 },
    Completed { num_utxos: u64, amount: Amount },
    ScanningRoundFailed { retry_count: u64, retry_limit: u64 },
    RecoveryFailed,
}

impl DomainEvent {
    #[inline]
    pub fn kind(&self) -> EventKind {
        EventKind::from(self)
    }

    /// The id of the transaction this event is about, if any.
    pub fn tx_id(&self) -> Option<TxId> {
        match self {
            Self::TxReceived(tx) => Some(tx.id),
            Self::TxReplyReceived { id, .. }
            | Self::TxFinalized { id, .. }
            | Self::InboundTxBroadcast(id)
            | Self::OutboundTxBroadcast(id)
            | Self::DirectSendResult { id, .. } => Some(*id),
            Self::TxMinedUnconfirmed { tx, .. }
            | Self::TxMined(tx)
            | Self::TxFauxUnconfirmed { tx, .. }
            | Self::TxFauxConfirmed(tx) => Some(tx.id),
            Self::TxCancelled(cancelled) => Some(cancelled.tx.id),
            Self::BalanceUpdated(_)
            | Self::ValidationComplete { .. }
            | Self::ConnectivityChanged(_)
            | Self::RecoveryProgress(_) => None,
        }
    }
}

impl EventKind {
    /// Every kind which changes transaction state.
    pub const TX: &'static [EventKind] = &[
        Self::TxReceived,
        Self::TxReplyReceived,
        Self::TxFinalized,
        Self::InboundTxBroadcast,
        Self::OutboundTxBroadcast,
        Self::TxMinedUnconfirmed,
        Self::TxMined,
        Self::TxFauxUnconfirmed,
        Self::TxFauxConfirmed,
        Self::TxCancelled,
    ];
}

impl SendStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Queued,
            1 => Self::DirectSendSafSend,
            2 => Self::DirectSend,
            3 => Self::SafSend,
            _ => Self::Invalid,
        }
    }
}

impl ConnectivityStatus {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Connecting),
            1 => Some(Self::Online),
            2 => Some(Self::Offline),
            _ => None,
        }
    }
}

impl RecoveryEvent {
    /// Decode the engine's `(event, first, second)` recovery callback args.
    pub fn from_parts(event: u8, first: u64, second: u64) -> Option<Self> {
        let event = match event {
            0 => Self::ConnectingToBaseNode,
            1 => Self::ConnectedToBaseNode,
            2 => Self::ConnectionToBaseNodeFailed {
                retry_count: first,
                retry_limit: second,
            },
            3 => Self::Progress {
                current_block: first,
                total_blocks: second,
            },
            4 => Self::Completed {
                num_utxos: first,
                amount: Amount(second),
            },
            5 => Self::ScanningRoundFailed {
                retry_count: first,
                retry_limit: second,
            },
            6 => Self::RecoveryFailed,
            _ => return None,
        };
        Some(event)
    }

    /// Whether no further recovery events will follow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::RecoveryFailed)
    }
}

/// A bounded, thread-safe bus of [`DomainEvent`]s. Clone to get another
/// handle. Publishing never blocks; a slow subscriber lags instead.
#[derive(Clone)]
pub struct DomainEventBus {
    inner: EventsBus<DomainEvent>,
}

/// A registration for some set of [`EventKind`]s. Dropping it unsubscribes.
pub struct Subscription {
    kinds: Vec<EventKind>,
    rx: EventsRx<DomainEvent>,
}

impl DomainEventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: EventsBus::new_with_size(capacity),
        }
    }

    pub fn publish(&self, event: DomainEvent) {
        self.inner.send(event)
    }

    /// Subscribe to events of the given kinds, starting from now.
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        Subscription {
            kinds: kinds.to_vec(),
            rx: self.inner.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.receiver_count()
    }
}

impl Subscription {
    /// Wait for the next matching event. A [`Lagged`] error means events were
    /// dropped and the subscriber should resync from the engine.
    pub async fn recv(&mut self) -> Result<DomainEvent, Lagged> {
        let kinds = &self.kinds;
        self.rx
            .recv_filtered(|event| kinds.contains(&event.kind()))
            .await
    }

    #[inline]
    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }

    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio_test::{assert_pending, assert_ready_eq};

    use super::*;

    #[test]
    fn subscribers_only_see_their_kinds() {
        let bus = DomainEventBus::new(16);
        let mut tx_sub = bus.subscribe(EventKind::TX);
        let mut conn_sub = bus.subscribe(&[EventKind::ConnectivityChanged]);

        bus.publish(DomainEvent::ConnectivityChanged(ConnectivityStatus::Online));
        bus.publish(DomainEvent::InboundTxBroadcast(TxId(3)));

        let mut recv = tokio_test::task::spawn(tx_sub.recv());
        assert_ready_eq!(recv.poll(), Ok(DomainEvent::InboundTxBroadcast(TxId(3))));
        drop(recv);

        let mut recv = tokio_test::task::spawn(conn_sub.recv());
        assert_ready_eq!(
            recv.poll(),
            Ok(DomainEvent::ConnectivityChanged(ConnectivityStatus::Online))
        );
        drop(recv);

        // Nothing else for the connectivity subscriber
        let mut recv = tokio_test::task::spawn(conn_sub.recv());
        assert_pending!(recv.poll());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = DomainEventBus::new(16);
        let sub = bus.subscribe(&[EventKind::BalanceUpdated]);
        assert_eq!(bus.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
        // Publishing with no subscribers is fine
        bus.publish(DomainEvent::BalanceUpdated(Balance::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn lagged_subscriber_is_told() {
        let bus = DomainEventBus::new(2);
        let mut sub = bus.subscribe(EventKind::TX);
        for id in 0..5 {
            bus.publish(DomainEvent::InboundTxBroadcast(TxId(id)));
        }
        assert_eq!(sub.recv().await, Err(Lagged(3)));
        assert_eq!(sub.recv().await.unwrap().tx_id(), Some(TxId(3)));

        let next = tokio::time::timeout(Duration::from_secs(1), async {
            sub.recv().await.unwrap();
            sub.recv().await
        });
        assert!(next.await.is_err(), "Only one event left");
    }

    #[test]
    fn decode_engine_codes() {
        assert_eq!(ConnectivityStatus::from_code(1), Some(ConnectivityStatus::Online));
        assert_eq!(ConnectivityStatus::from_code(3), None);
        assert_eq!(
            RecoveryEvent::from_parts(3, 10, 100),
            Some(RecoveryEvent::Progress {
                current_block: 10,
                total_blocks: 100
            })
        );
        assert!(RecoveryEvent::from_parts(4, 2, 5_000).unwrap().is_terminal());
        assert_eq!(RecoveryEvent::from_parts(7, 0, 0), None);
        assert_eq!(SendStatus::from_code(2), SendStatus::DirectSend);
        assert_eq!(SendStatus::from_code(-1), SendStatus::Invalid);
    }
}
