//! An in-memory [`NativeEngine`] for tests.
//!
//! - Every handle it hands out is tracked, so tests can assert that nothing
//!   leaked ([`live_handles`]) and nothing was released twice (`destroy`
//!   panics on an unknown handle).
//! - Failures can be injected per call name, optionally after a number of
//!   successful calls, and optionally alongside a bogus returned handle.
//! - The wallet's collections live in [`MockWallet`] and can be poked
//!   directly; callbacks are fired through [`MockEngine::listener`].
//! - [`MockEngine::run_before_call`] runs a closure just before a given call,
//!   outside the engine's lock, to interleave work with a multi-call read.
//!
//! [`live_handles`]: MockEngine::live_handles

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use crate::{
    ffi::{
        engine::{
            AddressRole, BalanceField, CallbackSpec, NativeEngine, TxCollection,
            TxField, WalletCallbacks,
        },
        error::ErrorSlot,
        handle::{NativeHandle, ObjectKind},
    },
    tx::{
        Amount, CancellationReason, CancelledTx, CompletedTx, PendingInboundTx,
        PendingOutboundTx, TxDirection, TxId, TxStatus, WalletAddress,
    },
};

pub const UNKNOWN_HANDLE: i32 = 3;
pub const WRONG_KIND: i32 = 4;
pub const NOT_FOUND: i32 = 5;
/// Returned alongside a failure by [`MockEngine::fail_call_with_handle`].
pub const BOGUS_HANDLE: NativeHandle = NativeHandle(0xdead_beef);

pub struct MockEngine {
    inner: Mutex<Inner>,
    listener: Mutex<Option<Arc<dyn WalletCallbacks>>>,
    hooks: Mutex<HashMap<&'static str, Hook>>,
}

struct Hook {
    skip: usize,
    f: Box<dyn FnOnce() + Send>,
}

/// The engine-side wallet state.
#[derive(Default)]
pub struct MockWallet {
    pub network: String,
    pub address: Vec<u8>,
    pub balance: [u64; 4],
    pub pending_inbound: BTreeMap<u128, PendingInboundTx>,
    pub pending_outbound: BTreeMap<u128, PendingOutboundTx>,
    pub completed: BTreeMap<u128, CompletedTx>,
    pub cancelled: BTreeMap<u128, CancelledTx>,
    pub contacts: Vec<(String, Vec<u8>)>,
    pub required_confirmations: u64,
    pub next_tx_id: u128,
    pub next_request_id: u64,
    pub broadcast_restarts: usize,
    pub base_node_peers: Vec<(Vec<u8>, String)>,
    pub recovery_base_node: Option<Vec<u8>>,
    pub num_callbacks: usize,
}

#[derive(Clone)]
enum Object {
    Wallet,
    CompletedTx(CompletedTx, CancellationReason),
    PendingInboundTx(PendingInboundTx),
    PendingOutboundTx(PendingOutboundTx),
    Balance([u64; 4]),
    WalletAddress(Vec<u8>),
    ByteVector(Vec<u8>),
    Contact(String, Vec<u8>),
    Vector(ObjectKind, Vec<Object>),
}

struct Failure {
    skip: usize,
    code: i32,
    handle: NativeHandle,
}

struct Inner {
    objects: HashMap<u64, Object>,
    next_handle: u64,
    destroyed: usize,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, Failure>,
    wallet: MockWallet,
}

impl Inner {
    fn alloc(&mut self, object: Object) -> NativeHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.objects.insert(handle, object);
        NativeHandle(handle)
    }

    fn txs(&self, collection: TxCollection) -> Vec<Object> {
        let wallet = &self.wallet;
        match collection {
            TxCollection::PendingInbound => wallet
                .pending_inbound
                .values()
                .cloned()
                .map(Object::PendingInboundTx)
                .collect(),
            TxCollection::PendingOutbound => wallet
                .pending_outbound
                .values()
                .cloned()
                .map(Object::PendingOutboundTx)
                .collect(),
            TxCollection::Completed => wallet
                .completed
                .values()
                .map(|tx| {
                    Object::CompletedTx(tx.clone(), CancellationReason::Unknown)
                })
                .collect(),
            TxCollection::Cancelled => wallet
                .cancelled
                .values()
                .map(|c| Object::CompletedTx(c.tx.clone(), c.reason))
                .collect(),
        }
    }
}

impl Object {
    fn kind(&self) -> ObjectKind {
        match self {
            Self::Wallet => ObjectKind::Wallet,
            Self::CompletedTx(..) => ObjectKind::CompletedTx,
            Self::PendingInboundTx(_) => ObjectKind::PendingInboundTx,
            Self::PendingOutboundTx(_) => ObjectKind::PendingOutboundTx,
            Self::Balance(_) => ObjectKind::Balance,
            Self::WalletAddress(_) => ObjectKind::WalletAddress,
            Self::ByteVector(_) => ObjectKind::ByteVector,
            Self::Contact(..) => ObjectKind::Contact,
            Self::Vector(kind, _) => *kind,
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        let wallet = MockWallet {
            address: vec![0xaa; 32],
            required_confirmations: 3,
            next_tx_id: 1_000,
            next_request_id: 1,
            ..MockWallet::default()
        };
        Self {
            inner: Mutex::new(Inner {
                objects: HashMap::new(),
                next_handle: 0x1000,
                destroyed: 0,
                calls: HashMap::new(),
                failures: HashMap::new(),
                wallet,
            }),
            listener: Mutex::new(None),
            hooks: Mutex::new(HashMap::new()),
        }
    }

    // --- Test fixtures --- //

    pub fn completed_tx(id: u128, timestamp: u64, outbound: bool) -> CompletedTx {
        CompletedTx {
            id: TxId(id),
            source_address: WalletAddress::from_bytes(vec![0x01; 32]),
            destination_address: WalletAddress::from_bytes(vec![0x02; 32]),
            amount: Amount(1_000),
            fee: Amount(100),
            timestamp,
            message: format!("tx {id}"),
            status: TxStatus::MinedConfirmed,
            direction: if outbound {
                TxDirection::Outbound
            } else {
                TxDirection::Inbound
            },
            confirmations: 3,
        }
    }

    pub fn pending_inbound_tx(id: u128, timestamp: u64) -> PendingInboundTx {
        PendingInboundTx {
            id: TxId(id),
            source_address: WalletAddress::from_bytes(vec![0x01; 32]),
            amount: Amount(1_000),
            timestamp,
            message: format!("tx {id}"),
            status: TxStatus::Pending,
        }
    }

    pub fn pending_outbound_tx(id: u128, timestamp: u64) -> PendingOutboundTx {
        PendingOutboundTx {
            id: TxId(id),
            destination_address: WalletAddress::from_bytes(vec![0x02; 32]),
            amount: Amount(1_000),
            fee: Amount(100),
            timestamp,
            message: format!("tx {id}"),
            status: TxStatus::Pending,
        }
    }

    fn alloc(&self, object: Object) -> NativeHandle {
        self.inner.lock().unwrap().alloc(object)
    }

    pub fn alloc_completed_tx(&self, tx: CompletedTx) -> NativeHandle {
        self.alloc(Object::CompletedTx(tx, CancellationReason::Unknown))
    }

    pub fn alloc_cancelled_tx(&self, tx: CancelledTx) -> NativeHandle {
        self.alloc(Object::CompletedTx(tx.tx, tx.reason))
    }

    pub fn alloc_pending_inbound_tx(&self, tx: PendingInboundTx) -> NativeHandle {
        self.alloc(Object::PendingInboundTx(tx))
    }

    pub fn alloc_pending_outbound_tx(
        &self,
        tx: PendingOutboundTx,
    ) -> NativeHandle {
        self.alloc(Object::PendingOutboundTx(tx))
    }

    pub fn alloc_balance(&self, balance: [u64; 4]) -> NativeHandle {
        self.alloc(Object::Balance(balance))
    }

    pub fn alloc_completed_vector(&self, txs: Vec<CompletedTx>) -> NativeHandle {
        let elements = txs
            .into_iter()
            .map(|tx| Object::CompletedTx(tx, CancellationReason::Unknown))
            .collect();
        self.alloc(Object::Vector(ObjectKind::CompletedTxVector, elements))
    }

    /// Access the engine-side wallet state.
    pub fn with_wallet<R>(&self, f: impl FnOnce(&mut MockWallet) -> R) -> R {
        f(&mut self.inner.lock().unwrap().wallet)
    }

    /// The callbacks registered at wallet creation.
    pub fn listener(&self) -> Option<Arc<dyn WalletCallbacks>> {
        self.listener.lock().unwrap().clone()
    }

    // --- Failure injection --- //

    /// Make every following `call` fail with `code`.
    pub fn fail_call(&self, call: &'static str, code: i32) {
        self.fail_call_after(call, 0, code);
    }

    /// Let `skip` calls succeed, then fail every following `call`.
    pub fn fail_call_after(&self, call: &'static str, skip: usize, code: i32) {
        let failure = Failure {
            skip,
            code,
            handle: NativeHandle::NULL,
        };
        self.inner.lock().unwrap().failures.insert(call, failure);
    }

    /// Fail `call`, but still return [`BOGUS_HANDLE`], which must never be
    /// wrapped or destroyed.
    pub fn fail_call_with_handle(&self, call: &'static str, code: i32) {
        let failure = Failure {
            skip: 0,
            code,
            handle: BOGUS_HANDLE,
        };
        self.inner.lock().unwrap().failures.insert(call, failure);
    }

    /// Let `skip` calls through, then run `f` once right before the next
    /// `call`. Only wallet collection reads and validation starts check for
    /// hooks.
    pub fn run_before_call(
        &self,
        call: &'static str,
        skip: usize,
        f: impl FnOnce() + Send + 'static,
    ) {
        let hook = Hook {
            skip,
            f: Box::new(f),
        };
        self.hooks.lock().unwrap().insert(call, hook);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().failures.clear();
    }

    // --- Accounting --- //

    /// Handles handed out and not yet destroyed, excluding the wallet.
    pub fn live_handles(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .values()
            .filter(|o| !matches!(o, Object::Wallet))
            .count()
    }

    pub fn wallet_is_live(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.objects.values().any(|o| matches!(o, Object::Wallet))
    }

    pub fn destroy_count(&self) -> usize {
        self.inner.lock().unwrap().destroyed
    }

    pub fn call_count(&self, call: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.calls.get(call).copied().unwrap_or(0)
    }

    pub fn at_calls(&self) -> usize {
        self.call_count("vector_get_at")
    }

    // --- Call plumbing --- //

    fn run_hook(&self, call: &'static str) {
        let mut hooks = self.hooks.lock().unwrap();
        let Some(hook) = hooks.get_mut(call) else {
            return;
        };
        if hook.skip > 0 {
            hook.skip -= 1;
            return;
        }
        let hook = hooks.remove(call);
        drop(hooks);
        if let Some(hook) = hook {
            (hook.f)();
        }
    }

    /// Record the call and apply any injected failure. On failure, returns
    /// the handle the failed call should return.
    fn enter(
        inner: &mut Inner,
        call: &'static str,
        err: &mut ErrorSlot,
    ) -> Result<(), NativeHandle> {
        *inner.calls.entry(call).or_default() += 1;
        let Some(failure) = inner.failures.get_mut(call) else {
            return Ok(());
        };
        if failure.skip > 0 {
            failure.skip -= 1;
            return Ok(());
        }
        err.set(failure.code, format!("injected failure in {call}"));
        Err(failure.handle)
    }

    /// A call which reads a value out of an object.
    fn read<T: Default>(
        &self,
        call: &'static str,
        handle: NativeHandle,
        err: &mut ErrorSlot,
        f: impl FnOnce(&Object) -> Option<T>,
    ) -> T {
        let mut inner = self.inner.lock().unwrap();
        if Self::enter(&mut inner, call, err).is_err() {
            return T::default();
        }
        let Some(object) = inner.objects.get(&handle.0) else {
            err.set(UNKNOWN_HANDLE, format!("{call}: unknown {handle}"));
            return T::default();
        };
        f(object).unwrap_or_else(|| {
            err.set(WRONG_KIND, format!("{call}: wrong object kind"));
            T::default()
        })
    }

    /// A call which reads a new owned object out of an object.
    fn read_new(
        &self,
        call: &'static str,
        handle: NativeHandle,
        err: &mut ErrorSlot,
        f: impl FnOnce(&Object) -> Option<Object>,
    ) -> NativeHandle {
        let mut inner = self.inner.lock().unwrap();
        if let Err(handle) = Self::enter(&mut inner, call, err) {
            return handle;
        }
        let Some(object) = inner.objects.get(&handle.0) else {
            err.set(UNKNOWN_HANDLE, format!("{call}: unknown {handle}"));
            return NativeHandle::NULL;
        };
        match f(object) {
            Some(new) => inner.alloc(new),
            None => {
                err.set(WRONG_KIND, format!("{call}: wrong object kind"));
                NativeHandle::NULL
            }
        }
    }

    /// A call against the wallet. `f` may allocate new objects.
    fn wallet_call<T: Default>(
        &self,
        call: &'static str,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
        f: impl FnOnce(&mut Inner, &mut ErrorSlot) -> T,
    ) -> T {
        let mut inner = self.inner.lock().unwrap();
        if Self::enter(&mut inner, call, err).is_err() {
            return T::default();
        }
        if !matches!(inner.objects.get(&wallet.0), Some(Object::Wallet)) {
            err.set(UNKNOWN_HANDLE, format!("{call}: unknown wallet {wallet}"));
            return T::default();
        }
        f(&mut inner, err)
    }

    /// A wallet call returning a new owned handle.
    fn wallet_new(
        &self,
        call: &'static str,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
        f: impl FnOnce(&mut Inner, &mut ErrorSlot) -> Option<Object>,
    ) -> NativeHandle {
        let mut inner = self.inner.lock().unwrap();
        if let Err(handle) = Self::enter(&mut inner, call, err) {
            return handle;
        }
        if !matches!(inner.objects.get(&wallet.0), Some(Object::Wallet)) {
            err.set(UNKNOWN_HANDLE, format!("{call}: unknown wallet {wallet}"));
            return NativeHandle::NULL;
        }
        match f(&mut inner, err) {
            Some(object) => inner.alloc(object),
            None => NativeHandle::NULL,
        }
    }
}

fn tx_field(object: &Object, field: TxField) -> Option<Vec<u8>> {
    let bytes = match (object, field) {
        (Object::CompletedTx(tx, _), TxField::Id) => tx.id.0.to_be_bytes().to_vec(),
        (Object::PendingInboundTx(tx), TxField::Id) =>
            tx.id.0.to_be_bytes().to_vec(),
        (Object::PendingOutboundTx(tx), TxField::Id) =>
            tx.id.0.to_be_bytes().to_vec(),
        (Object::CompletedTx(tx, _), TxField::Amount) =>
            tx.amount.0.to_be_bytes().to_vec(),
        (Object::PendingInboundTx(tx), TxField::Amount) =>
            tx.amount.0.to_be_bytes().to_vec(),
        (Object::PendingOutboundTx(tx), TxField::Amount) =>
            tx.amount.0.to_be_bytes().to_vec(),
        (Object::CompletedTx(tx, _), TxField::Fee) =>
            tx.fee.0.to_be_bytes().to_vec(),
        (Object::PendingOutboundTx(tx), TxField::Fee) =>
            tx.fee.0.to_be_bytes().to_vec(),
        (Object::CompletedTx(tx, _), TxField::Timestamp) =>
            tx.timestamp.to_be_bytes().to_vec(),
        (Object::PendingInboundTx(tx), TxField::Timestamp) =>
            tx.timestamp.to_be_bytes().to_vec(),
        (Object::PendingOutboundTx(tx), TxField::Timestamp) =>
            tx.timestamp.to_be_bytes().to_vec(),
        _ => return None,
    };
    Some(bytes)
}

impl NativeEngine for MockEngine {
    fn destroy(&self, kind: ObjectKind, handle: NativeHandle) {
        let mut inner = self.inner.lock().unwrap();
        *inner.calls.entry("destroy").or_default() += 1;
        let object = inner.objects.remove(&handle.0);
        drop(inner);
        match object {
            Some(object) => assert_eq!(
                object.kind(),
                kind,
                "Destroyed {handle} with the wrong kind"
            ),
            None => panic!("Double free or unknown {kind} handle {handle}"),
        }
        self.inner.lock().unwrap().destroyed += 1;
    }

    fn vector_len(
        &self,
        _kind: ObjectKind,
        vector: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u32 {
        self.read("vector_len", vector, err, |object| match object {
            Object::Vector(_, elements) => u32::try_from(elements.len()).ok(),
            _ => None,
        })
    }

    fn vector_get_at(
        &self,
        _kind: ObjectKind,
        vector: NativeHandle,
        index: u32,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        self.read_new("vector_get_at", vector, err, |object| match object {
            Object::Vector(_, elements) =>
                elements.get(usize::try_from(index).ok()?).cloned(),
            _ => None,
        })
    }

    fn byte_vector_len(&self, bytes: NativeHandle, err: &mut ErrorSlot) -> u32 {
        self.read("byte_vector_len", bytes, err, |object| match object {
            Object::ByteVector(bytes) => u32::try_from(bytes.len()).ok(),
            _ => None,
        })
    }

    fn byte_vector_get_at(
        &self,
        bytes: NativeHandle,
        index: u32,
        err: &mut ErrorSlot,
    ) -> u8 {
        self.read("byte_vector_get_at", bytes, err, |object| match object {
            Object::ByteVector(bytes) =>
                bytes.get(usize::try_from(index).ok()?).copied(),
            _ => None,
        })
    }

    fn tx_get_field(
        &self,
        _kind: ObjectKind,
        tx: NativeHandle,
        field: TxField,
        err: &mut ErrorSlot,
    ) -> Vec<u8> {
        self.read("tx_get_field", tx, err, |object| tx_field(object, field))
    }

    fn tx_get_message(
        &self,
        _kind: ObjectKind,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> String {
        self.read("tx_get_message", tx, err, |object| match object {
            Object::CompletedTx(tx, _) => Some(tx.message.clone()),
            Object::PendingInboundTx(tx) => Some(tx.message.clone()),
            Object::PendingOutboundTx(tx) => Some(tx.message.clone()),
            _ => None,
        })
    }

    fn tx_get_status(
        &self,
        _kind: ObjectKind,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> i32 {
        self.read("tx_get_status", tx, err, |object| match object {
            Object::CompletedTx(tx, _) => Some(tx.status.code()),
            Object::PendingInboundTx(tx) => Some(tx.status.code()),
            Object::PendingOutboundTx(tx) => Some(tx.status.code()),
            _ => None,
        })
    }

    fn tx_get_address(
        &self,
        _kind: ObjectKind,
        tx: NativeHandle,
        role: AddressRole,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        self.read_new("tx_get_address", tx, err, |object| {
            let address = match (object, role) {
                (Object::CompletedTx(tx, _), AddressRole::Source) =>
                    &tx.source_address,
                (Object::CompletedTx(tx, _), AddressRole::Destination) =>
                    &tx.destination_address,
                (Object::PendingInboundTx(tx), AddressRole::Source) =>
                    &tx.source_address,
                (Object::PendingOutboundTx(tx), AddressRole::Destination) =>
                    &tx.destination_address,
                _ => return None,
            };
            Some(Object::WalletAddress(address.as_bytes().to_vec()))
        })
    }

    fn completed_tx_is_outbound(
        &self,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> bool {
        self.read("completed_tx_is_outbound", tx, err, |object| match object {
            Object::CompletedTx(tx, _) =>
                Some(tx.direction == TxDirection::Outbound),
            _ => None,
        })
    }

    fn completed_tx_confirmations(
        &self,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64 {
        self.read("completed_tx_confirmations", tx, err, |object| match object {
            Object::CompletedTx(tx, _) => Some(tx.confirmations),
            _ => None,
        })
    }

    fn completed_tx_cancellation_reason(
        &self,
        tx: NativeHandle,
        err: &mut ErrorSlot,
    ) -> i32 {
        let call = "completed_tx_cancellation_reason";
        self.read(call, tx, err, |object| match object {
            Object::CompletedTx(_, reason) => Some(reason.code()),
            _ => None,
        })
    }

    fn address_get_bytes(
        &self,
        address: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        self.read_new("address_get_bytes", address, err, |object| match object {
            Object::WalletAddress(bytes) => Some(Object::ByteVector(bytes.clone())),
            _ => None,
        })
    }

    fn address_create(&self, bytes: &[u8], err: &mut ErrorSlot) -> NativeHandle {
        let mut inner = self.inner.lock().unwrap();
        if let Err(handle) = Self::enter(&mut inner, "address_create", err) {
            return handle;
        }
        if bytes.len() != 32 {
            err.set(WRONG_KIND, "address_create: bad key length");
            return NativeHandle::NULL;
        }
        inner.alloc(Object::WalletAddress(bytes.to_vec()))
    }

    fn contact_get_alias(
        &self,
        contact: NativeHandle,
        err: &mut ErrorSlot,
    ) -> String {
        self.read("contact_get_alias", contact, err, |object| match object {
            Object::Contact(alias, _) => Some(alias.clone()),
            _ => None,
        })
    }

    fn contact_get_address(
        &self,
        contact: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        self.read_new("contact_get_address", contact, err, |object| {
            match object {
                Object::Contact(_, address) =>
                    Some(Object::WalletAddress(address.clone())),
                _ => None,
            }
        })
    }

    fn balance_get(
        &self,
        balance: NativeHandle,
        field: BalanceField,
        err: &mut ErrorSlot,
    ) -> Vec<u8> {
        self.read("balance_get", balance, err, |object| {
            let Object::Balance(balance) = object else {
                return None;
            };
            let value = match field {
                BalanceField::Available => balance[0],
                BalanceField::PendingIncoming => balance[1],
                BalanceField::PendingOutgoing => balance[2],
                BalanceField::TimeLocked => balance[3],
            };
            Some(value.to_be_bytes().to_vec())
        })
    }

    fn wallet_create(
        &self,
        network: &str,
        callbacks: &'static [CallbackSpec],
        listener: Arc<dyn WalletCallbacks>,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        let mut inner = self.inner.lock().unwrap();
        if let Err(handle) = Self::enter(&mut inner, "wallet_create", err) {
            return handle;
        }
        inner.wallet.network = network.to_owned();
        inner.wallet.num_callbacks = callbacks.len();
        let handle = inner.alloc(Object::Wallet);
        drop(inner);
        *self.listener.lock().unwrap() = Some(listener);
        handle
    }

    fn wallet_get_address(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        self.wallet_new("wallet_get_address", wallet, err, |inner, _| {
            Some(Object::WalletAddress(inner.wallet.address.clone()))
        })
    }

    fn wallet_get_balance(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        self.wallet_new("wallet_get_balance", wallet, err, |inner, _| {
            Some(Object::Balance(inner.wallet.balance))
        })
    }

    fn wallet_get_txs(
        &self,
        wallet: NativeHandle,
        collection: TxCollection,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        self.run_hook("wallet_get_txs");
        self.wallet_new("wallet_get_txs", wallet, err, |inner, _| {
            let elements = inner.txs(collection);
            Some(Object::Vector(collection.vector_kind(), elements))
        })
    }

    fn wallet_get_tx_by_id(
        &self,
        wallet: NativeHandle,
        collection: TxCollection,
        id: u128,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        self.wallet_new("wallet_get_tx_by_id", wallet, err, |inner, err| {
            let w = &inner.wallet;
            let found = match collection {
                TxCollection::PendingInbound => w
                    .pending_inbound
                    .get(&id)
                    .cloned()
                    .map(Object::PendingInboundTx),
                TxCollection::PendingOutbound => w
                    .pending_outbound
                    .get(&id)
                    .cloned()
                    .map(Object::PendingOutboundTx),
                TxCollection::Completed => w.completed.get(&id).map(|tx| {
                    Object::CompletedTx(tx.clone(), CancellationReason::Unknown)
                }),
                TxCollection::Cancelled => w
                    .cancelled
                    .get(&id)
                    .map(|c| Object::CompletedTx(c.tx.clone(), c.reason)),
            };
            if found.is_none() {
                err.set(NOT_FOUND, format!("No {collection} tx with id {id}"));
            }
            found
        })
    }

    fn wallet_get_contacts(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> NativeHandle {
        self.wallet_new("wallet_get_contacts", wallet, err, |inner, _| {
            let contacts = inner
                .wallet
                .contacts
                .iter()
                .map(|(alias, address)| {
                    Object::Contact(alias.clone(), address.clone())
                })
                .collect();
            Some(Object::Vector(ObjectKind::ContactVector, contacts))
        })
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
        self.wallet_call("wallet_send_tx", wallet, err, |inner, err| {
            let Some(Object::WalletAddress(dest)) =
                inner.objects.get(&destination.0).cloned()
            else {
                err.set(UNKNOWN_HANDLE, "wallet_send_tx: bad destination");
                return Vec::new();
            };
            let w = &mut inner.wallet;
            let id = w.next_tx_id;
            w.next_tx_id += 1;
            let tx = PendingOutboundTx {
                id: TxId(id),
                destination_address: WalletAddress::from_bytes(dest),
                amount: Amount(amount),
                fee: Amount(fee_per_gram),
                timestamp: 1_700_000_000,
                message: message.to_owned(),
                status: TxStatus::Pending,
            };
            w.pending_outbound.insert(id, tx);
            id.to_be_bytes().to_vec()
        })
    }

    fn wallet_cancel_pending_tx(
        &self,
        wallet: NativeHandle,
        id: u128,
        err: &mut ErrorSlot,
    ) -> bool {
        self.wallet_call("wallet_cancel_pending_tx", wallet, err, |inner, err| {
            let w = &mut inner.wallet;
            let tx = match (
                w.pending_inbound.remove(&id),
                w.pending_outbound.remove(&id),
            ) {
                (Some(tx), _) => CompletedTx {
                    id: tx.id,
                    source_address: tx.source_address,
                    destination_address: WalletAddress::from_bytes(
                        w.address.clone(),
                    ),
                    amount: tx.amount,
                    fee: Amount::ZERO,
                    timestamp: tx.timestamp,
                    message: tx.message,
                    status: tx.status,
                    direction: TxDirection::Inbound,
                    confirmations: 0,
                },
                (None, Some(tx)) => CompletedTx {
                    id: tx.id,
                    source_address: WalletAddress::from_bytes(
                        w.address.clone(),
                    ),
                    destination_address: tx.destination_address,
                    amount: tx.amount,
                    fee: tx.fee,
                    timestamp: tx.timestamp,
                    message: tx.message,
                    status: tx.status,
                    direction: TxDirection::Outbound,
                    confirmations: 0,
                },
                (None, None) => {
                    err.set(NOT_FOUND, format!("No pending tx with id {id}"));
                    return false;
                }
            };
            let reason = CancellationReason::UserCancelled;
            w.cancelled.insert(id, CancelledTx { tx, reason });
            true
        })
    }

    fn wallet_start_txo_validation(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64 {
        self.run_hook("wallet_start_txo_validation");
        self.wallet_call("wallet_start_txo_validation", wallet, err, |inner, _| {
            inner.wallet.next_request_id += 1;
            inner.wallet.next_request_id
        })
    }

    fn wallet_start_tx_validation(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64 {
        self.run_hook("wallet_start_tx_validation");
        self.wallet_call("wallet_start_tx_validation", wallet, err, |inner, _| {
            inner.wallet.next_request_id += 1;
            inner.wallet.next_request_id
        })
    }

    fn wallet_restart_tx_broadcast(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> bool {
        self.wallet_call("wallet_restart_tx_broadcast", wallet, err, |inner, _| {
            inner.wallet.broadcast_restarts += 1;
            true
        })
    }

    fn wallet_get_required_confirmations(
        &self,
        wallet: NativeHandle,
        err: &mut ErrorSlot,
    ) -> u64 {
        let call = "wallet_get_required_confirmations";
        self.wallet_call(call, wallet, err, |inner, _| {
            inner.wallet.required_confirmations
        })
    }

    fn wallet_set_required_confirmations(
        &self,
        wallet: NativeHandle,
        count: u64,
        err: &mut ErrorSlot,
    ) {
        let call = "wallet_set_required_confirmations";
        self.wallet_call(call, wallet, err, |inner, _| {
            inner.wallet.required_confirmations = count;
        })
    }

    fn wallet_add_base_node_peer(
        &self,
        wallet: NativeHandle,
        public_key: NativeHandle,
        address: &str,
        err: &mut ErrorSlot,
    ) -> bool {
        self.wallet_call("wallet_add_base_node_peer", wallet, err, |inner, err| {
            let Some(Object::WalletAddress(key)) =
                inner.objects.get(&public_key.0).cloned()
            else {
                err.set(UNKNOWN_HANDLE, "wallet_add_base_node_peer: bad key");
                return false;
            };
            inner.wallet.base_node_peers.push((key, address.to_owned()));
            true
        })
    }

    fn wallet_start_recovery(
        &self,
        wallet: NativeHandle,
        base_node_public_key: NativeHandle,
        err: &mut ErrorSlot,
    ) -> bool {
        self.wallet_call("wallet_start_recovery", wallet, err, |inner, err| {
            let Some(Object::WalletAddress(key)) =
                inner.objects.get(&base_node_public_key.0).cloned()
            else {
                err.set(UNKNOWN_HANDLE, "wallet_start_recovery: bad key");
                return false;
            };
            inner.wallet.recovery_base_node = Some(key);
            true
        })
    }
}
