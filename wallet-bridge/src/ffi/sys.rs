//! [`SysEngine`]: the [`NativeEngine`] backed by the engine's C library.
//!
//! The C API identifies objects by `(kind, handle)` and reports failures
//! through an `int* error_out`. Strings come back as heap `char*` which must
//! be returned via `string_destroy`; wide integers come back as a
//! `ByteVector` handle holding big-endian bytes, and 128-bit ids go in as a
//! `(hi, lo)` pair.
//!
//! Callbacks arrive through the `extern "C"` trampolines below, each of
//! which receives the context pointer registered at wallet creation. A
//! trampoline never unwinds into the engine.

use std::{
    collections::HashMap,
    ffi::{CStr, CString, c_char, c_int, c_uint, c_void},
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
};

use tracing::error;

use crate::ffi::{
    engine::{
        AddressRole, BalanceField, CallbackSpec, NativeEngine, TxCollection,
        TxField, WalletCallbacks,
    },
    error::ErrorSlot,
    handle::{NativeHandle, ObjectKind},
};

/// Reported when an argument can't be marshalled, e.g. a string with an
/// interior NUL. Engine codes are all positive.
const MARSHAL_ERROR: i32 = -1;

#[link(name = "wallet_engine")]
unsafe extern "C" {
    fn object_destroy(kind: c_int, handle: u64);
    fn string_destroy(s: *mut c_char);

    fn vector_get_length(kind: c_int, vector: u64, error_out: *mut c_int)
    -> c_uint;
    fn vector_get_at(
        kind: c_int,
        vector: u64,
        index: c_uint,
        error_out: *mut c_int,
    ) -> u64;
    fn byte_vector_create(
        bytes: *const u8,
        len: c_uint,
        error_out: *mut c_int,
    ) -> u64;
    fn byte_vector_get_length(bytes: u64, error_out: *mut c_int) -> c_uint;
    fn byte_vector_get_at(bytes: u64, index: c_uint, error_out: *mut c_int)
    -> u8;

    fn tx_get_field(
        kind: c_int,
        tx: u64,
        field: c_int,
        error_out: *mut c_int,
    ) -> u64;
    fn tx_get_message(kind: c_int, tx: u64, error_out: *mut c_int)
    -> *mut c_char;
    fn tx_get_status(kind: c_int, tx: u64, error_out: *mut c_int) -> c_int;
    fn tx_get_public_key(
        kind: c_int,
        tx: u64,
        role: c_int,
        error_out: *mut c_int,
    ) -> u64;
    fn completed_tx_is_outbound(tx: u64, error_out: *mut c_int) -> bool;
    fn completed_tx_get_confirmations(tx: u64, error_out: *mut c_int) -> u64;
    fn completed_tx_get_cancellation_reason(
        tx: u64,
        error_out: *mut c_int,
    ) -> c_int;

    fn public_key_get_bytes(public_key: u64, error_out: *mut c_int) -> u64;
    fn public_key_create(bytes: u64, error_out: *mut c_int) -> u64;
    fn contact_get_alias(contact: u64, error_out: *mut c_int) -> *mut c_char;
    fn contact_get_public_key(contact: u64, error_out: *mut c_int) -> u64;
    fn balance_get(balance: u64, field: c_int, error_out: *mut c_int) -> u64;

    fn wallet_create(
        network: *const c_char,
        context: *mut c_void,
        callbacks: *const RawCallbacks,
        error_out: *mut c_int,
    ) -> u64;
    fn wallet_get_public_key(wallet: u64, error_out: *mut c_int) -> u64;
    fn wallet_get_balance(wallet: u64, error_out: *mut c_int) -> u64;
    fn wallet_get_transactions(
        wallet: u64,
        collection: c_int,
        error_out: *mut c_int,
    ) -> u64;
    fn wallet_get_transaction_by_id(
        wallet: u64,
        collection: c_int,
        id_hi: u64,
        id_lo: u64,
        error_out: *mut c_int,
    ) -> u64;
    fn wallet_get_contacts(wallet: u64, error_out: *mut c_int) -> u64;
    fn wallet_send_transaction(
        wallet: u64,
        destination: u64,
        amount: u64,
        fee_per_gram: u64,
        message: *const c_char,
        error_out: *mut c_int,
    ) -> u64;
    fn wallet_cancel_pending_transaction(
        wallet: u64,
        id_hi: u64,
        id_lo: u64,
        error_out: *mut c_int,
    ) -> bool;
    fn wallet_start_txo_validation(wallet: u64, error_out: *mut c_int) -> u64;
    fn wallet_start_transaction_validation(
        wallet: u64,
        error_out: *mut c_int,
    ) -> u64;
    fn wallet_restart_transaction_broadcast(
        wallet: u64,
        error_out: *mut c_int,
    ) -> bool;
    fn wallet_get_num_confirmations_required(
        wallet: u64,
        error_out: *mut c_int,
    ) -> u64;
    fn wallet_set_num_confirmations_required(
        wallet: u64,
        count: u64,
        error_out: *mut c_int,
    );
    fn wallet_add_base_node_peer(
        wallet: u64,
        public_key: u64,
        address: *const c_char,
        error_out: *mut c_int,
    ) -> bool;
    fn wallet_start_recovery(
        wallet: u64,
        base_node_public_key: u64,
        error_out: *mut c_int,
    ) -> bool;
}

/// The callback table in registration order. Must stay in sync with
/// [`CALLBACKS`](crate::callbacks::CALLBACKS).
#[repr(C)]
struct RawCallbacks {
    on_tx_received: extern "C" fn(*mut c_void, u64),
    on_tx_reply_received: extern "C" fn(*mut c_void, u64),
    on_tx_finalized: extern "C" fn(*mut c_void, u64),
    on_tx_broadcast: extern "C" fn(*mut c_void, u64),
    on_tx_mined: extern "C" fn(*mut c_void, u64),
    on_tx_mined_unconfirmed: extern "C" fn(*mut c_void, u64, u64),
    on_tx_faux_confirmed: extern "C" fn(*mut c_void, u64),
    on_tx_faux_unconfirmed: extern "C" fn(*mut c_void, u64, u64),
    on_direct_send_result:
        extern "C" fn(*mut c_void, *const u8, c_uint, c_int),
    on_tx_cancelled: extern "C" fn(*mut c_void, u64, c_int),
    on_txo_validation_complete: extern "C" fn(*mut c_void, u64, u64),
    on_tx_validation_complete: extern "C" fn(*mut c_void, u64, u64),
    on_balance_updated: extern "C" fn(*mut c_void, u64),
    on_connectivity_status: extern "C" fn(*mut c_void, u64),
    on_recovery_progress: extern "C" fn(*mut c_void, u8, u64, u64),
}

const RAW_CALLBACK_NAMES: [&str; 15] = [
    "on_tx_received",
    "on_tx_reply_received",
    "on_tx_finalized",
    "on_tx_broadcast",
    "on_tx_mined",
    "on_tx_mined_unconfirmed",
    "on_tx_faux_confirmed",
    "on_tx_faux_unconfirmed",
    "on_direct_send_result",
    "on_tx_cancelled",
    "on_txo_validation_complete",
    "on_tx_validation_complete",
    "on_balance_updated",
    "on_connectivity_status",
    "on_recovery_progress",
];

static RAW_CALLBACKS: RawCallbacks = RawCallbacks {
    on_tx_received: trampoline::on_tx_received,
    on_tx_reply_received: trampoline::on_tx_reply_received,
    on_tx_finalized: trampoline::on_tx_finalized,
    on_tx_broadcast: trampoline::on_tx_broadcast,
    on_tx_mined: trampoline::on_tx_mined,
    on_tx_mined_unconfirmed: trampoline::on_tx_mined_unconfirmed,
    on_tx_faux_confirmed: trampoline::on_tx_faux_confirmed,
    on_tx_faux_unconfirmed: trampoline::on_tx_faux_unconfirmed,
    on_direct_send_result: trampoline::on_direct_send_result,
    on_tx_cancelled: trampoline::on_tx_cancelled,
    on_txo_validation_complete: trampoline::on_txo_validation_complete,
    on_tx_validation_complete: trampoline::on_tx_validation_complete,
    on_balance_updated: trampoline::on_balance_updated,
    on_connectivity_status: trampoline::on_connectivity_status,
    on_recovery_progress: trampoline::on_recovery_progress,
};

/// What the engine's context pointer points at.
type Context = Arc<dyn WalletCallbacks>;

#[derive(Default)]
pub struct SysEngine {
    /// Context pointers (as `usize`) by wallet handle, freed when the
    /// wallet is destroyed.
    contexts: Mutex<HashMap<u64, usize>>,
}

impl SysEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

// --- Marshalling helpers --- //

/// Run a raw call with a fresh `error_out`, copying any failure into `err`.
fn raw<T>(
    name: &'static str,
    err: &mut ErrorSlot,
    f: impl FnOnce(*mut c_int) -> T,
) -> T {
    let mut code: c_int = 0;
    let value = f(&raw mut code);
    if code != 0 {
        err.set(code, format!("{name} failed"));
    }
    value
}

fn kind_code(kind: ObjectKind) -> c_int {
    match kind {
        ObjectKind::Wallet => 0,
        ObjectKind::CompletedTx => 1,
        ObjectKind::PendingInboundTx => 2,
        ObjectKind::PendingOutboundTx => 3,
        ObjectKind::Balance => 4,
        ObjectKind::WalletAddress => 5,
        ObjectKind::ByteVector => 6,
        ObjectKind::Contact => 7,
        ObjectKind::CompletedTxVector => 8,
        ObjectKind::PendingInboundTxVector => 9,
        ObjectKind::PendingOutboundTxVector => 10,
        ObjectKind::ContactVector => 11,
    }
}

fn collection_code(collection: TxCollection) -> c_int {
    match collection {
        TxCollection::PendingInbound => 0,
        TxCollection::PendingOutbound => 1,
        TxCollection::Completed => 2,
        TxCollection::Cancelled => 3,
    }
}

fn split_id(id: u128) -> (u64, u64) {
    ((id >> 64) as u64, id as u64)
}

fn c_string(s: &str, err: &mut ErrorSlot) -> Option<CString> {
    match CString::new(s) {
        Ok(s) => Some(s),
        Err(_) => {
            err.set(MARSHAL_ERROR, "String contains a NUL byte");
            None
        }
    }
}

/// Copy out an engine-allocated string and give it back.
fn take_string(s: *mut c_char) -> String {
    if s.is_null() {
        return String::new();
    }
    // SAFETY: non-null strings from the engine are NUL-terminated and live
    // until `string_destroy`.
    let owned = unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned();
    unsafe { string_destroy(s) };
    owned
}

/// Copy out an engine-allocated byte vector and destroy it, even if reading
/// fails partway.
fn take_byte_vector(bytes: u64, err: &mut ErrorSlot) -> Vec<u8> {
    if !err.is_ok() || bytes == 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    let len = raw("byte_vector_get_length", err, |e| unsafe {
        byte_vector_get_length(bytes, e)
    });
    for index in 0..len {
        if !err.is_ok() {
            break;
        }
        out.push(raw("byte_vector_get_at", err, |e| unsafe {
            byte_vector_get_at(bytes, index, e)
        }));
    }
    unsafe { object_destroy(kind_code(ObjectKind::ByteVector), bytes) };
    out
}

impl NativeEngine for SysEngine {
    fn destroy(&self, kind: ObjectKind, handle: NativeHandle) {
        unsafe { object_destroy(kind_code(kind), handle.0) };

        // No more callbacks once the wallet is gone, so its context can go.
        if kind == ObjectKind::Wallet
            && let Some(context) =
                self.contexts.lock().unwrap().remove(&handle.0)
        {
            // SAFETY: created by `Box::into_raw` in `wallet_create`.
            drop(unsafe { Box::from_raw(context as *mut Context) });
        }
    }

    fn vector_len(
        &self,
        kind: ObjectKind,
        vector: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u32 {
        raw("vector_get_length", err, |e| unsafe {
            vector_get_length(kind_code(kind), vector.0, e)
        })
    }

    fn vector_get_at(
        &self,
        kind: ObjectKind,
        vector: NativeHandle,
        index: u32,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        NativeHandle(raw("vector_get_at", err, |e| unsafe {
            vector_get_at(kind_code(kind), vector.0, index, e)
        }))
    }

    fn byte_vector_len(&self, bytes: NativeHandle, err: &mut ErrorSlot) -> u32 {
        raw("byte_vector_get_length", err, |e| unsafe {
            byte_vector_get_length(bytes.0, e)
        })
    }

    fn byte_vector_get_at(
        &self,
        bytes: NativeHandle,
        index: u32,
        err: &mut ErrorSlot,
    ) -> u8 {
        raw("byte_vector_get_at", err, |e| unsafe {
            byte_vector_get_at(bytes.0, index, e)
        })
    }

    fn tx_get_field(
        &self,
        kind: ObjectKind,
        tx: NativeHandle,
        field: TxField,
        err: &mut ErrorSlot,
    ) -> Vec<u8> {
        let field = match field {
            TxField::Id => 0,
            TxField::Amount => 1,
            TxField::Fee => 2,
            TxField::Timestamp => 3,
        };
        let bytes = raw("tx_get_field", err, |e| unsafe {
            tx_get_field(kind_code(kind), tx.0, field, e)
        });
        take_byte_vector(bytes, err)
    }

    fn tx_get_message(
        &self,
        kind: ObjectKind,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> String {
        take_string(raw("tx_get_message", err, |e| unsafe {
            tx_get_message(kind_code(kind), tx.0, e)
        }))
    }

    fn tx_get_status(
        &self,
        kind: ObjectKind,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> i32 {
        raw("tx_get_status", err, |e| unsafe {
            tx_get_status(kind_code(kind), tx.0, e)
        })
    }

    fn tx_get_address(
        &self,
        kind: ObjectKind,
        tx: NativeHandle,
        role: AddressRole,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        let role = match role {
            AddressRole::Source => 0,
            AddressRole::Destination => 1,
        };
        NativeHandle(raw("tx_get_public_key", err, |e| unsafe {
            tx_get_public_key(kind_code(kind), tx.0, role, e)
        }))
    }

    fn completed_tx_is_outbound(
        &self,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> bool {
        raw("completed_tx_is_outbound", err, |e| unsafe {
            completed_tx_is_outbound(tx.0, e)
        })
    }

    fn completed_tx_confirmations(
        &self,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64 {
        raw("completed_tx_get_confirmations", err, |e| unsafe {
            completed_tx_get_confirmations(tx.0, e)
        })
    }

    fn completed_tx_cancellation_reason(
        &self,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> i32 {
        raw("completed_tx_get_cancellation_reason", err, |e| unsafe {
            completed_tx_get_cancellation_reason(tx.0, e)
        })
    }

    fn address_get_bytes(
        &self,
        address: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        NativeHandle(raw("public_key_get_bytes", err, |e| unsafe {
            public_key_get_bytes(address.0, e)
        }))
    }

    fn address_create(&self, bytes: &[u8], err: &mut ErrorSlot) -> NativeHandle {
        let Ok(len) = c_uint::try_from(bytes.len()) else {
            err.set(MARSHAL_ERROR, "Key material too long");
            return NativeHandle::NULL;
        };
        let byte_vector = raw("byte_vector_create", err, |e| unsafe {
            byte_vector_create(bytes.as_ptr(), len, e)
        });
        if !err.is_ok() {
            return NativeHandle::NULL;
        }
        let public_key = raw("public_key_create", err, |e| unsafe {
            public_key_create(byte_vector, e)
        });
        unsafe { object_destroy(kind_code(ObjectKind::ByteVector), byte_vector) };
        NativeHandle(public_key)
    }

    fn contact_get_alias(
        &self,
        contact: NativeHandle,
        err: &mut ErrorSlot,
    ) -> String {
        take_string(raw("contact_get_alias", err, |e| unsafe {
            contact_get_alias(contact.0, e)
        }))
    }

    fn contact_get_address(
        &self,
        contact: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        NativeHandle(raw("contact_get_public_key", err, |e| unsafe {
            contact_get_public_key(contact.0, e)
        }))
    }

    fn balance_get(
        &self,
        balance: NativeHandle,
        field: BalanceField,
        err: &mut ErrorSlot,
    ) -> Vec<u8> {
        let field = match field {
            BalanceField::Available => 0,
            BalanceField::PendingIncoming => 1,
            BalanceField::PendingOutgoing => 2,
            BalanceField::TimeLocked => 3,
        };
        let bytes = raw("balance_get", err, |e| unsafe {
            balance_get(balance.0, field, e)
        });
        take_byte_vector(bytes, err)
    }

    fn wallet_create(
        &self,
        network: &str,
        callbacks: &'static [CallbackSpec],
        listener: Arc<dyn WalletCallbacks>,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        debug_assert!(
            callbacks.iter().map(|c| c.name).eq(RAW_CALLBACK_NAMES),
            "Callback table out of sync with the raw trampolines",
        );
        let Some(network) = c_string(network, err) else {
            return NativeHandle::NULL;
        };

        let context = Box::into_raw(Box::new(listener));
        let wallet = raw("wallet_create", err, |e| unsafe {
            wallet_create(
                network.as_ptr(),
                context.cast::<c_void>(),
                &RAW_CALLBACKS,
                e,
            )
        });

        if err.is_ok() && wallet != 0 {
            self.contexts
                .lock()
                .unwrap()
                .insert(wallet, context as usize);
        } else {
            // SAFETY: the engine didn't keep the context.
            drop(unsafe { Box::from_raw(context) });
        }
        NativeHandle(wallet)
    }

    fn wallet_get_address(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        NativeHandle(raw("wallet_get_public_key", err, |e| unsafe {
            wallet_get_public_key(wallet.0, e)
        }))
    }

    fn wallet_get_balance(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        NativeHandle(raw("wallet_get_balance", err, |e| unsafe {
            wallet_get_balance(wallet.0, e)
        }))
    }

    fn wallet_get_txs(
        &self,
        wallet: NativeHandle,
        collection: TxCollection,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        NativeHandle(raw("wallet_get_transactions", err, |e| unsafe {
            wallet_get_transactions(wallet.0, collection_code(collection), e)
        }))
    }

    fn wallet_get_tx_by_id(
        &self,
        wallet: NativeHandle,
        collection: TxCollection,
        id: u128,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        let (hi, lo) = split_id(id);
        NativeHandle(raw("wallet_get_transaction_by_id", err, |e| unsafe {
            wallet_get_transaction_by_id(
                wallet.0,
                collection_code(collection),
                hi,
                lo,
                e,
            )
        }))
    }

    fn wallet_get_contacts(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        NativeHandle(raw("wallet_get_contacts", err, |e| unsafe {
            wallet_get_contacts(wallet.0, e)
        }))
    }

    fn wallet_send_tx(
        &self,
        wallet: NativeHandle,
        destination: NativeHandle,
        amount: u64,
        fee_per_gram: u64,
        message: &str,
        err: &mut ErrorSlot,
    ) -> Vec<u8> {
        let Some(message) = c_string(message, err) else {
            return Vec::new();
        };
        let id = raw("wallet_send_transaction", err, |e| unsafe {
            wallet_send_transaction(
                wallet.0,
                destination.0,
                amount,
                fee_per_gram,
                message.as_ptr(),
                e,
            )
        });
        take_byte_vector(id, err)
    }

    fn wallet_cancel_pending_tx(
        &self,
        wallet: NativeHandle,
        id: u128,
        err: &mut ErrorSlot,
    ) -> bool {
        let (hi, lo) = split_id(id);
        raw("wallet_cancel_pending_transaction", err, |e| unsafe {
            wallet_cancel_pending_transaction(wallet.0, hi, lo, e)
        })
    }

    fn wallet_start_txo_validation(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64 {
        raw("wallet_start_txo_validation", err, |e| unsafe {
            wallet_start_txo_validation(wallet.0, e)
        })
    }

    fn wallet_start_tx_validation(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64 {
        raw("wallet_start_transaction_validation", err, |e| unsafe {
            wallet_start_transaction_validation(wallet.0, e)
        })
    }

    fn wallet_restart_tx_broadcast(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> bool {
        raw("wallet_restart_transaction_broadcast", err, |e| unsafe {
            wallet_restart_transaction_broadcast(wallet.0, e)
        })
    }

    fn wallet_get_required_confirmations(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64 {
        raw("wallet_get_num_confirmations_required", err, |e| unsafe {
            wallet_get_num_confirmations_required(wallet.0, e)
        })
    }

    fn wallet_set_required_confirmations(
        &self,
        wallet: NativeHandle,
        count: u64,
        err: &mut ErrorSlot,
    ) {
        raw("wallet_set_num_confirmations_required", err, |e| unsafe {
            wallet_set_num_confirmations_required(wallet.0, count, e)
        })
    }

    fn wallet_add_base_node_peer(
        &self,
        wallet: NativeHandle,
        public_key: NativeHandle,
        address: &str,
        err: &mut ErrorSlot,
    ) -> bool {
        let Some(address) = c_string(address, err) else {
            return false;
        };
        raw("wallet_add_base_node_peer", err, |e| unsafe {
            wallet_add_base_node_peer(wallet.0, public_key.0, address.as_ptr(), e)
        })
    }

    fn wallet_start_recovery(
        &self,
        wallet: NativeHandle,
        base_node_public_key: NativeHandle,
        err: &mut ErrorSlot,
    ) -> bool {
        raw("wallet_start_recovery", err, |e| unsafe {
            wallet_start_recovery(wallet.0, base_node_public_key.0, e)
        })
    }
}

mod trampoline {
    use super::*;

    /// Resolve the context and run `f`, catching any panic.
    fn with_listener(
        name: &'static str,
        context: *mut c_void,
        f: impl FnOnce(&dyn WalletCallbacks),
    ) {
        if context.is_null() {
            error!("{name}: null context");
            return;
        }
        // SAFETY: `context` came from `Box::into_raw` in `wallet_create` and
        // is only freed after the engine has destroyed the wallet, after
        // which it makes no more callbacks.
        let listener = unsafe { &*context.cast::<Context>() };
        let result =
            panic::catch_unwind(AssertUnwindSafe(|| f(listener.as_ref())));
        if result.is_err() {
            error!("{name}: panicked");
        }
    }

    pub(super) extern "C" fn on_tx_received(context: *mut c_void, tx: u64) {
        with_listener("on_tx_received", context, |l| {
            l.on_tx_received(NativeHandle(tx))
        })
    }

    pub(super) extern "C" fn on_tx_reply_received(
        context: *mut c_void,
        tx: u64,
    ) {
        with_listener("on_tx_reply_received", context, |l| {
            l.on_tx_reply_received(NativeHandle(tx))
        })
    }

    pub(super) extern "C" fn on_tx_finalized(context: *mut c_void, tx: u64) {
        with_listener("on_tx_finalized", context, |l| {
            l.on_tx_finalized(NativeHandle(tx))
        })
    }

    pub(super) extern "C" fn on_tx_broadcast(context: *mut c_void, tx: u64) {
        with_listener("on_tx_broadcast", context, |l| {
            l.on_tx_broadcast(NativeHandle(tx))
        })
    }

    pub(super) extern "C" fn on_tx_mined(context: *mut c_void, tx: u64) {
        with_listener("on_tx_mined", context, |l| {
            l.on_tx_mined(NativeHandle(tx))
        })
    }

    pub(super) extern "C" fn on_tx_mined_unconfirmed(
        context: *mut c_void,
        tx: u64,
        confirmations: u64,
    ) {
        with_listener("on_tx_mined_unconfirmed", context, |l| {
            l.on_tx_mined_unconfirmed(NativeHandle(tx), confirmations)
        })
    }

    pub(super) extern "C" fn on_tx_faux_confirmed(
        context: *mut c_void,
        tx: u64,
    ) {
        with_listener("on_tx_faux_confirmed", context, |l| {
            l.on_tx_faux_confirmed(NativeHandle(tx))
        })
    }

    pub(super) extern "C" fn on_tx_faux_unconfirmed(
        context: *mut c_void,
        tx: u64,
        confirmations: u64,
    ) {
        with_listener("on_tx_faux_unconfirmed", context, |l| {
            l.on_tx_faux_unconfirmed(NativeHandle(tx), confirmations)
        })
    }

    pub(super) extern "C" fn on_direct_send_result(
        context: *mut c_void,
        tx_id: *const u8,
        len: c_uint,
        status: c_int,
    ) {
        with_listener("on_direct_send_result", context, |l| {
            let tx_id = if tx_id.is_null() {
                &[][..]
            } else {
                // SAFETY: the engine passes `len` readable bytes which live
                // for the duration of the callback.
                unsafe { std::slice::from_raw_parts(tx_id, len as usize) }
            };
            l.on_direct_send_result(tx_id, status)
        })
    }

    pub(super) extern "C" fn on_tx_cancelled(
        context: *mut c_void,
        tx: u64,
        reason: c_int,
    ) {
        with_listener("on_tx_cancelled", context, |l| {
            l.on_tx_cancelled(NativeHandle(tx), reason)
        })
    }

    pub(super) extern "C" fn on_txo_validation_complete(
        context: *mut c_void,
        request_id: u64,
        status: u64,
    ) {
        with_listener("on_txo_validation_complete", context, |l| {
            l.on_txo_validation_complete(request_id, status)
        })
    }

    pub(super) extern "C" fn on_tx_validation_complete(
        context: *mut c_void,
        request_id: u64,
        status: u64,
    ) {
        with_listener("on_tx_validation_complete", context, |l| {
            l.on_tx_validation_complete(request_id, status)
        })
    }

    pub(super) extern "C" fn on_balance_updated(
        context: *mut c_void,
        balance: u64,
    ) {
        with_listener("on_balance_updated", context, |l| {
            l.on_balance_updated(NativeHandle(balance))
        })
    }

    pub(super) extern "C" fn on_connectivity_status(
        context: *mut c_void,
        status: u64,
    ) {
        with_listener("on_connectivity_status", context, |l| {
            l.on_connectivity_status(status)
        })
    }

    pub(super) extern "C" fn on_recovery_progress(
        context: *mut c_void,
        event: u8,
        first: u64,
        second: u64,
    ) {
        with_listener("on_recovery_progress", context, |l| {
            l.on_recovery_progress(event, first, second)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::callbacks::CALLBACKS;

    #[test]
    fn raw_table_matches_registration_table() {
        assert!(CALLBACKS.iter().map(|c| c.name).eq(RAW_CALLBACK_NAMES));
    }

    #[test]
    fn id_split() {
        let id = (7u128 << 64) | 9;
        assert_eq!(split_id(id), (7, 9));
        assert_eq!(split_id(u128::MAX), (u64::MAX, u64::MAX));
    }
}
