//! The two directions of the native boundary.
//!
//! - [`NativeEngine`]: calls we make into the engine.
//! - [`WalletCallbacks`]: calls the engine makes into us, on its own threads.
//!
//! Conventions for [`NativeEngine`] methods:
//!
//! - Every fallible call takes a `&mut ErrorSlot`. If the engine sets a
//!   non-zero code, the return value must be ignored, including any handle.
//! - Returned handles are owned by the caller and must be released via
//!   [`NativeEngine::destroy`] exactly once.
//! - Handle arguments are borrowed; the engine never takes ownership of them.
//! - Integers too wide for the C ABI (ids, amounts, fees, timestamps) come
//!   back as unsigned big-endian bytes.

use std::sync::Arc;

use crate::ffi::{
    error::ErrorSlot,
    handle::{NativeHandle, ObjectKind},
};

/// The wide integer fields of a transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TxField {
    Id,
    Amount,
    Fee,
    Timestamp,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressRole {
    Source,
    Destination,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BalanceField {
    Available,
    PendingIncoming,
    PendingOutgoing,
    TimeLocked,
}

/// The four transaction collections the engine maintains.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, strum::Display)]
pub enum TxCollection {
    PendingInbound,
    PendingOutbound,
    Completed,
    Cancelled,
}

impl TxCollection {
    pub fn vector_kind(self) -> ObjectKind {
        match self {
            Self::PendingInbound => ObjectKind::PendingInboundTxVector,
            Self::PendingOutbound => ObjectKind::PendingOutboundTxVector,
            Self::Completed | Self::Cancelled => ObjectKind::CompletedTxVector,
        }
    }

    pub fn element_kind(self) -> ObjectKind {
        match self {
            Self::PendingInbound => ObjectKind::PendingInboundTx,
            Self::PendingOutbound => ObjectKind::PendingOutboundTx,
            Self::Completed | Self::Cancelled => ObjectKind::CompletedTx,
        }
    }
}

/// One entry in the callback registration table handed to the engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CallbackSpec {
    pub name: &'static str,
    pub signature: &'static str,
}

pub trait NativeEngine: Send + Sync + 'static {
    /// Release a native object. Must be called exactly once per handle.
    fn destroy(&self, kind: ObjectKind, handle: NativeHandle);

    // --- Collections --- //

    fn vector_len(
        &self,
        kind: ObjectKind,
        vector: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u32;
    fn vector_get_at(
        &self,
        kind: ObjectKind,
        vector: NativeHandle,
        index: u32,
        err: &mut ErrorSlot,
    ) -> NativeHandle;
    fn byte_vector_len(&self, bytes: NativeHandle, err: &mut ErrorSlot) -> u32;
    fn byte_vector_get_at(
        &self,
        bytes: NativeHandle,
        index: u32,
        err: &mut ErrorSlot,
    ) -> u8;

    // --- Transactions --- //

    /// Big-endian bytes of a wide integer field.
    fn tx_get_field(
        &self,
        kind: ObjectKind,
        tx: NativeHandle,
        field: TxField,
        err: &mut ErrorSlot,
    ) -> Vec<u8>;
    fn tx_get_message(
        &self,
        kind: ObjectKind,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> String;
    fn tx_get_status(
        &self,
        kind: ObjectKind,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> i32;
    /// Returns an owned `WalletAddress` handle.
    fn tx_get_address(
        &self,
        kind: ObjectKind,
        tx: NativeHandle,
        role: AddressRole,
        err: &mut ErrorSlot,
    ) -> NativeHandle;
    fn completed_tx_is_outbound(
        &self,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> bool;
    fn completed_tx_confirmations(
        &self,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64;
    fn completed_tx_cancellation_reason(
        &self,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> i32;

    // --- Addresses, contacts, balances --- //

    /// Returns an owned `ByteVector` handle.
    fn address_get_bytes(
        &self,
        address: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle;
    fn address_create(&self, bytes: &[u8], err: &mut ErrorSlot) -> NativeHandle;
    fn contact_get_alias(
        &self,
        contact: NativeHandle,
        err: &mut ErrorSlot,
    ) -> String;
    /// Returns an owned `WalletAddress` handle.
    fn contact_get_address(
        &self,
        contact: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle;
    /// Big-endian bytes of a balance component.
    fn balance_get(
        &self,
        balance: NativeHandle,
        field: BalanceField,
        err: &mut ErrorSlot,
    ) -> Vec<u8>;

    // --- Wallet --- //

    fn wallet_create(
        &self,
        network: &str,
        callbacks: &'static [CallbackSpec],
        listener: Arc<dyn WalletCallbacks>,
        err: &mut ErrorSlot,
    ) -> NativeHandle;
    fn wallet_get_address(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle;
    fn wallet_get_balance(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle;
    fn wallet_get_txs(
        &self,
        wallet: NativeHandle,
        collection: TxCollection,
        err: &mut ErrorSlot,
    ) -> NativeHandle;
    fn wallet_get_tx_by_id(
        &self,
        wallet: NativeHandle,
        collection: TxCollection,
        id: u128,
        err: &mut ErrorSlot,
    ) -> NativeHandle;
    fn wallet_get_contacts(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle;
    /// Returns the new tx id as big-endian bytes.
    fn wallet_send_tx(
        &self,
        wallet: NativeHandle,
        destination: NativeHandle,
        amount: u64,
        fee_per_gram: u64,
        message: &str,
        err: &mut ErrorSlot,
    ) -> Vec<u8>;
    fn wallet_cancel_pending_tx(
        &self,
        wallet: NativeHandle,
        id: u128,
        err: &mut ErrorSlot,
    ) -> bool;
    /// Returns the request id echoed back in the completion callback.
    fn wallet_start_txo_validation(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64;
    /// Returns the request id echoed back in the completion callback.
    fn wallet_start_tx_validation(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64;
    fn wallet_restart_tx_broadcast(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> bool;
    fn wallet_get_required_confirmations(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64;
    fn wallet_set_required_confirmations(
        &self,
        wallet: NativeHandle,
        count: u64,
        err: &mut ErrorSlot,
    );
    fn wallet_add_base_node_peer(
        &self,
        wallet: NativeHandle,
        public_key: NativeHandle,
        address: &str,
        err: &mut ErrorSlot,
    ) -> bool;
    fn wallet_start_recovery(
        &self,
        wallet: NativeHandle,
        base_node_public_key: NativeHandle,
        err: &mut ErrorSlot,
    ) -> bool;
}

/// Callbacks the engine invokes on its own threads. Handles passed in are
/// owned by the callee, which must release them.
///
/// Implementations must not panic or block for long.
pub trait WalletCallbacks: Send + Sync + 'static {
    fn on_tx_received(&self, tx: NativeHandle);
    fn on_tx_reply_received(&self, tx: NativeHandle);
    fn on_tx_finalized(&self, tx: NativeHandle);
    fn on_tx_broadcast(&self, tx: NativeHandle);
    fn on_tx_mined(&self, tx: NativeHandle);
    fn on_tx_mined_unconfirmed(&self, tx: NativeHandle, confirmations: u64);
    fn on_tx_faux_confirmed(&self, tx: NativeHandle);
    fn on_tx_faux_unconfirmed(&self, tx: NativeHandle, confirmations: u64);
    fn on_direct_send_result(&self, tx_id: &[u8], status: i32);
    fn on_tx_cancelled(&self, tx: NativeHandle, reason: i32);
    fn on_txo_validation_complete(&self, request_id: u64, status: u64);
    fn on_tx_validation_complete(&self, request_id: u64, status: u64);
    fn on_balance_updated(&self, balance: NativeHandle);
    fn on_connectivity_status(&self, status: u64);
    fn on_recovery_progress(&self, event: u8, first: u64, second: u64);
}
