//! Engine callbacks -> [`DomainEvent`]s.
//!
//! The engine calls into [`CallbackDispatcher`] on its own threads. Each
//! callback wraps the handles it was given, copies what it needs into one
//! immutable event, releases the wrappers, and publishes the event. Nothing
//! escapes a callback: a failed read or a panic is logged and the callback
//! returns normally without publishing anything.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use tracing::{debug, error};

use crate::{
    balance::Balance,
    event::{
        ConnectivityStatus, DomainEvent, DomainEventBus, RecoveryEvent,
        SendStatus, ValidationKind,
    },
    ffi::{
        engine::{CallbackSpec, NativeEngine, WalletCallbacks},
        error::FfiError,
        handle::NativeHandle,
        object::{FfiType, with_destroy},
        types::{FfiCompletedTx, FfiTx, be_u128},
    },
    tx::{
        CancellationReason, CancelledTx, CompletedTx, PendingInboundTx,
        TxDirection, TxId, TxStatus,
    },
};

/// The callbacks registered with the engine at wallet creation, in
/// registration order. Changing this table changes the engine protocol.
pub const CALLBACKS: &[CallbackSpec] = &[
    spec("on_tx_received", "(PendingInboundTx)"),
    spec("on_tx_reply_received", "(CompletedTx)"),
    spec("on_tx_finalized", "(CompletedTx)"),
    spec("on_tx_broadcast", "(CompletedTx)"),
    spec("on_tx_mined", "(CompletedTx)"),
    spec("on_tx_mined_unconfirmed", "(CompletedTx, u64)"),
    spec("on_tx_faux_confirmed", "(CompletedTx)"),
    spec("on_tx_faux_unconfirmed", "(CompletedTx, u64)"),
    spec("on_direct_send_result", "(bytes, i32)"),
    spec("on_tx_cancelled", "(CompletedTx, i32)"),
    spec("on_txo_validation_complete", "(u64, u64)"),
    spec("on_tx_validation_complete", "(u64, u64)"),
    spec("on_balance_updated", "(Balance)"),
    spec("on_connectivity_status", "(u64)"),
    spec("on_recovery_progress", "(u8, u64, u64)"),
];

const fn spec(name: &'static str, signature: &'static str) -> CallbackSpec {
    CallbackSpec { name, signature }
}

/// Engine status code for a successful validation.
const VALIDATION_SUCCESS: u64 = 0;

pub struct CallbackDispatcher {
    engine: Arc<dyn NativeEngine>,
    bus: DomainEventBus,
}

impl CallbackDispatcher {
    pub fn new(engine: Arc<dyn NativeEngine>, bus: DomainEventBus) -> Self {
        Self { engine, bus }
    }

    /// Build an event and publish it. Never panics.
    fn dispatch(
        &self,
        callback: &'static str,
        build: impl FnOnce() -> Result<DomainEvent, FfiError>,
    ) {
        match panic::catch_unwind(AssertUnwindSafe(build)) {
            Ok(Ok(event)) => {
                debug!(%callback, kind = %event.kind(), "Publishing event");
                self.bus.publish(event);
            }
            Ok(Err(e)) => error!("{callback}: failed to read event: {e:#}"),
            Err(_) => error!("{callback}: panicked while reading event"),
        }
    }

    /// Wrap `handle`, read it with `read`, then release it.
    fn read<T: FfiType, R>(
        &self,
        callback: &'static str,
        handle: NativeHandle,
        read: impl FnOnce(&T) -> Result<R, FfiError>,
    ) -> Result<R, FfiError> {
        let object = T::wrap(&self.engine, callback, handle)?;
        with_destroy(object, read)
    }

    fn completed_tx(
        &self,
        callback: &'static str,
        tx: NativeHandle,
    ) -> Result<CompletedTx, FfiError> {
        self.read(callback, tx, CompletedTx::read)
    }

    /// Read just the id and status out of a completed tx.
    fn id_and_status(
        &self,
        callback: &'static str,
        tx: NativeHandle,
    ) -> Result<(TxId, TxStatus), FfiError> {
        self.read(callback, tx, |tx: &FfiCompletedTx| {
            Ok((TxId(tx.id()?), TxStatus::from_code(tx.status()?)))
        })
    }

    fn validation_complete(
        &self,
        callback: &'static str,
        kind: ValidationKind,
        request_id: u64,
        status: u64,
    ) {
        self.dispatch(callback, || {
            Ok(DomainEvent::ValidationComplete {
                request_id,
                kind,
                success: status == VALIDATION_SUCCESS,
            })
        })
    }
}

impl WalletCallbacks for CallbackDispatcher {
    fn on_tx_received(&self, tx: NativeHandle) {
        let callback = "on_tx_received";
        self.dispatch(callback, || {
            self.read(callback, tx, PendingInboundTx::read)
                .map(DomainEvent::TxReceived)
        })
    }

    fn on_tx_reply_received(&self, tx: NativeHandle) {
        let callback = "on_tx_reply_received";
        self.dispatch(callback, || {
            let (id, status) = self.id_and_status(callback, tx)?;
            Ok(DomainEvent::TxReplyReceived { id, status })
        })
    }

    fn on_tx_finalized(&self, tx: NativeHandle) {
        let callback = "on_tx_finalized";
        self.dispatch(callback, || {
            let (id, status) = self.id_and_status(callback, tx)?;
            Ok(DomainEvent::TxFinalized { id, status })
        })
    }

    fn on_tx_broadcast(&self, tx: NativeHandle) {
        let callback = "on_tx_broadcast";
        self.dispatch(callback, || {
            let tx = self.completed_tx(callback, tx)?;
            Ok(match tx.direction {
                TxDirection::Inbound => DomainEvent::InboundTxBroadcast(tx.id),
                TxDirection::Outbound =>
                    DomainEvent::OutboundTxBroadcast(tx.id),
            })
        })
    }

    fn on_tx_mined(&self, tx: NativeHandle) {
        let callback = "on_tx_mined";
        self.dispatch(callback, || {
            self.completed_tx(callback, tx).map(DomainEvent::TxMined)
        })
    }

    fn on_tx_mined_unconfirmed(&self, tx: NativeHandle, confirmations: u64) {
        let callback = "on_tx_mined_unconfirmed";
        self.dispatch(callback, || {
            let tx = self.completed_tx(callback, tx)?;
            Ok(DomainEvent::TxMinedUnconfirmed { tx, confirmations })
        })
    }

    fn on_tx_faux_confirmed(&self, tx: NativeHandle) {
        let callback = "on_tx_faux_confirmed";
        self.dispatch(callback, || {
            self.completed_tx(callback, tx)
                .map(DomainEvent::TxFauxConfirmed)
        })
    }

    fn on_tx_faux_unconfirmed(&self, tx: NativeHandle, confirmations: u64) {
        let callback = "on_tx_faux_unconfirmed";
        self.dispatch(callback, || {
            let tx = self.completed_tx(callback, tx)?;
            Ok(DomainEvent::TxFauxUnconfirmed { tx, confirmations })
        })
    }

    fn on_direct_send_result(&self, tx_id: &[u8], status: i32) {
        let callback = "on_direct_send_result";
        self.dispatch(callback, || {
            Ok(DomainEvent::DirectSendResult {
                id: TxId(be_u128(callback, tx_id)?),
                status: SendStatus::from_code(status),
            })
        })
    }

    fn on_tx_cancelled(&self, tx: NativeHandle, reason: i32) {
        let callback = "on_tx_cancelled";
        self.dispatch(callback, || {
            let tx = self.completed_tx(callback, tx)?;
            let reason = CancellationReason::from_code(reason);
            Ok(DomainEvent::TxCancelled(CancelledTx { tx, reason }))
        })
    }

    fn on_txo_validation_complete(&self, request_id: u64, status: u64) {
        self.validation_complete(
            "on_txo_validation_complete",
            ValidationKind::Txo,
            request_id,
            status,
        )
    }

    fn on_tx_validation_complete(&self, request_id: u64, status: u64) {
        self.validation_complete(
            "on_tx_validation_complete",
            ValidationKind::Tx,
            request_id,
            status,
        )
    }

    fn on_balance_updated(&self, balance: NativeHandle) {
        let callback = "on_balance_updated";
        self.dispatch(callback, || {
            self.read(callback, balance, Balance::read)
                .map(DomainEvent::BalanceUpdated)
        })
    }

    fn on_connectivity_status(&self, status: u64) {
        let callback = "on_connectivity_status";
        self.dispatch(callback, || {
            ConnectivityStatus::from_code(status)
                .map(DomainEvent::ConnectivityChanged)
                .ok_or_else(|| {
                    FfiError::InvalidArgument(format!(
                        "Unknown connectivity status {status}"
                    ))
                })
        })
    }

    fn on_recovery_progress(&self, event: u8, first: u64, second: u64) {
        let callback = "on_recovery_progress";
        self.dispatch(callback, || {
            RecoveryEvent::from_parts(event, first, second)
                .map(DomainEvent::RecoveryProgress)
                .ok_or_else(|| {
                    FfiError::InvalidArgument(format!(
                        "Unknown recovery event {event}"
                    ))
                })
        })
    }
}
