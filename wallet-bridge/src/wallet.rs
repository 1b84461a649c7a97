//! The wallet context.
//!
//! A [`Wallet`] owns the engine's wallet handle and is passed around by
//! reference (or `Arc`) to whatever needs it; there is no global instance.
//! Every method is one or a few checked native calls, with each intermediate
//! handle released before returning.

use std::{sync::Arc, time::Duration};

use tracing::{info, instrument, warn};

use crate::{
    balance::Balance,
    callbacks::CALLBACKS,
    config::BridgeConfig,
    ffi::{
        engine::{NativeEngine, TxCollection, WalletCallbacks},
        error::{ErrorSlot, FfiError, checked},
        handle::NativeHandle,
        iterable::{FfiElement, FfiVector, find_in_iterable},
        object::{FfiType, with_destroy},
        types::{
            FfiBalance, FfiContact, FfiPendingInboundTx,
            FfiPendingOutboundTx, FfiTx, FfiWallet, FfiWalletAddress, be_u128,
        },
    },
    tx::{
        Amount, CancelledTx, CompletedTx, PendingInboundTx, PendingOutboundTx,
        TxId, WalletAddress,
    },
};

/// Engine code for "the recipient is still being discovered". The tx was
/// accepted and will go out once discovery finishes.
pub const DISCOVERY_IN_PROGRESS: i32 = 210;

pub struct Wallet {
    wallet: FfiWallet,
    address: WalletAddress,
    min_fee: Amount,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Contact {
    pub alias: String,
    pub address: WalletAddress,
}

impl Contact {
    fn read(contact: &FfiContact) -> Result<Self, FfiError> {
        Ok(Self {
            alias: contact.alias()?,
            address: WalletAddress::from_bytes(contact.address_bytes()?),
        })
    }
}

impl Wallet {
    /// Create the engine wallet and register `listener` for its callbacks.
    pub fn create(
        engine: Arc<dyn NativeEngine>,
        config: &BridgeConfig,
        listener: Arc<dyn WalletCallbacks>,
    ) -> Result<Self, FfiError> {
        let handle = checked("wallet_create", |err| {
            engine.wallet_create(&config.network, CALLBACKS, listener, err)
        })?;
        let mut wallet = FfiWallet::wrap(&engine, "wallet_create", handle)?;

        let address = match Self::read_address(&wallet) {
            Ok(address) => address,
            Err(e) => {
                wallet.destroy();
                return Err(e);
            }
        };

        info!(%address, network = %config.network, "Created wallet");
        Ok(Self {
            wallet,
            address,
            min_fee: Amount(config.min_fee),
        })
    }

    fn read_address(wallet: &FfiWallet) -> Result<WalletAddress, FfiError> {
        let address = wallet.object().call_wrap::<FfiWalletAddress>(
            "wallet_get_address",
            |engine, wallet, err| engine.wallet_get_address(wallet, err),
        )?;
        with_destroy(address, FfiWalletAddress::bytes)
            .map(WalletAddress::from_bytes)
    }

    /// This wallet's own address.
    #[inline]
    pub fn address(&self) -> &WalletAddress {
        &self.address
    }

    /// Release the engine wallet. Callbacks stop once this returns.
    pub fn destroy(mut self) {
        self.wallet.destroy();
        info!("Wallet destroyed");
    }

    // --- Plumbing --- //

    fn engine(&self) -> &Arc<dyn NativeEngine> {
        self.wallet.object().engine()
    }

    fn call<T>(
        &self,
        call: &'static str,
        f: impl FnOnce(&dyn NativeEngine, NativeHandle, &mut ErrorSlot) -> T,
    ) -> Result<T, FfiError> {
        self.wallet.object().call(call, f)
    }

    /// Create an engine-side address from `address`.
    fn address_handle(
        &self,
        address: &WalletAddress,
    ) -> Result<FfiWalletAddress, FfiError> {
        let handle = checked("address_create", |err| {
            self.engine().address_create(address.as_bytes(), err)
        })?;
        FfiWalletAddress::wrap(self.engine(), "address_create", handle)
    }

    /// Run `f` with a temporary engine-side copy of `address`.
    fn with_address_handle<R>(
        &self,
        address: &WalletAddress,
        f: impl FnOnce(NativeHandle) -> Result<R, FfiError>,
    ) -> Result<R, FfiError> {
        let address = self.address_handle(address)?;
        with_destroy(address, |address| f(address.object().handle()?))
    }

    fn txs<T: FfiElement, R>(
        &self,
        collection: TxCollection,
        read: impl FnMut(&T) -> Result<R, FfiError>,
    ) -> Result<Vec<R>, FfiError> {
        let vector = self.wallet.object().call_wrap::<FfiVector<T>>(
            "wallet_get_txs",
            |engine, wallet, err| engine.wallet_get_txs(wallet, collection, err),
        )?;
        vector.map_elements(read)
    }

    fn tx_by_id<T: FfiType, R>(
        &self,
        collection: TxCollection,
        id: TxId,
        read: impl FnOnce(&T) -> Result<R, FfiError>,
    ) -> Result<R, FfiError> {
        let tx = self.wallet.object().call_wrap::<T>(
            "wallet_get_tx_by_id",
            |engine, wallet, err| {
                engine.wallet_get_tx_by_id(wallet, collection, id.0, err)
            },
        )?;
        with_destroy(tx, read)
    }

    // --- Reads --- //

    pub fn balance(&self) -> Result<Balance, FfiError> {
        let balance = self.wallet.object().call_wrap::<FfiBalance>(
            "wallet_get_balance",
            |engine, wallet, err| engine.wallet_get_balance(wallet, err),
        )?;
        with_destroy(balance, Balance::read)
    }

    pub fn pending_inbound_txs(&self) -> Result<Vec<PendingInboundTx>, FfiError> {
        self.txs(TxCollection::PendingInbound, PendingInboundTx::read)
    }

    pub fn pending_outbound_txs(
        &self,
    ) -> Result<Vec<PendingOutboundTx>, FfiError> {
        self.txs(TxCollection::PendingOutbound, PendingOutboundTx::read)
    }

    pub fn completed_txs(&self) -> Result<Vec<CompletedTx>, FfiError> {
        self.txs(TxCollection::Completed, CompletedTx::read)
    }

    pub fn cancelled_txs(&self) -> Result<Vec<CancelledTx>, FfiError> {
        self.txs(TxCollection::Cancelled, CancelledTx::read)
    }

    pub fn pending_inbound_tx_by_id(
        &self,
        id: TxId,
    ) -> Result<PendingInboundTx, FfiError> {
        self.tx_by_id(TxCollection::PendingInbound, id, PendingInboundTx::read)
    }

    pub fn pending_outbound_tx_by_id(
        &self,
        id: TxId,
    ) -> Result<PendingOutboundTx, FfiError> {
        self.tx_by_id(TxCollection::PendingOutbound, id, PendingOutboundTx::read)
    }

    pub fn completed_tx_by_id(&self, id: TxId) -> Result<CompletedTx, FfiError> {
        self.tx_by_id(TxCollection::Completed, id, CompletedTx::read)
    }

    pub fn cancelled_tx_by_id(&self, id: TxId) -> Result<CancelledTx, FfiError> {
        self.tx_by_id(TxCollection::Cancelled, id, CancelledTx::read)
    }

    pub fn required_confirmations(&self) -> Result<u64, FfiError> {
        self.call("wallet_get_required_confirmations", |engine, wallet, err| {
            engine.wallet_get_required_confirmations(wallet, err)
        })
    }

    /// Look up a contact by address. Only the matching contact is read; the
    /// rest are released as the scan passes them.
    pub fn find_contact_by_address(
        &self,
        address: &WalletAddress,
    ) -> Result<Option<Contact>, FfiError> {
        let contacts = self.wallet.object().call_wrap::<FfiVector<FfiContact>>(
            "wallet_get_contacts",
            |engine, wallet, err| engine.wallet_get_contacts(wallet, err),
        )?;
        let found = find_in_iterable(contacts, |contact| {
            Ok(contact.address_bytes()? == address.as_bytes())
        })?;
        found
            .map(|contact| with_destroy(contact, Contact::read))
            .transpose()
    }

    // --- Actions --- //

    /// Send `amount` to `destination`.
    ///
    /// Returns `Ok(None)` if the engine accepted the tx but is still
    /// discovering the recipient, in which case no id is known yet.
    #[instrument(skip_all, name = "(send-tx)")]
    pub fn send_tx(
        &self,
        destination: &WalletAddress,
        amount: Amount,
        fee_per_gram: Amount,
        message: &str,
    ) -> Result<Option<TxId>, FfiError> {
        if amount == Amount::ZERO {
            return Err(FfiError::InvalidArgument(
                "Amount must be greater than zero".to_owned(),
            ));
        }
        if fee_per_gram < self.min_fee {
            return Err(FfiError::InvalidArgument(format!(
                "Fee must be at least {}",
                self.min_fee,
            )));
        }
        if *destination == self.address {
            return Err(FfiError::InvalidArgument(
                "Can't send to your own wallet".to_owned(),
            ));
        }

        let result = self.with_address_handle(destination, |destination| {
            self.call("wallet_send_tx", |engine, wallet, err| {
                engine.wallet_send_tx(
                    wallet,
                    destination,
                    amount.0,
                    fee_per_gram.0,
                    message,
                    err,
                )
            })
        });

        match result {
            Ok(id_bytes) => {
                let id = TxId(be_u128("wallet_send_tx", &id_bytes)?);
                info!(%id, %amount, %destination, "Sent tx");
                Ok(Some(id))
            }
            Err(e) if e.is_code(DISCOVERY_IN_PROGRESS) => {
                info!(%amount, "Tx queued while discovering recipient");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn cancel_pending_tx(&self, id: TxId) -> Result<bool, FfiError> {
        self.call("wallet_cancel_pending_tx", |engine, wallet, err| {
            engine.wallet_cancel_pending_tx(wallet, id.0, err)
        })
    }

    pub fn set_required_confirmations(&self, count: u64) -> Result<(), FfiError> {
        if count == 0 {
            return Err(FfiError::InvalidArgument(
                "Required confirmations must be at least 1".to_owned(),
            ));
        }
        self.call("wallet_set_required_confirmations", |engine, wallet, err| {
            engine.wallet_set_required_confirmations(wallet, count, err)
        })
    }

    pub fn add_base_node_peer(
        &self,
        public_key: &WalletAddress,
        address: &str,
    ) -> Result<bool, FfiError> {
        if address.trim().is_empty() {
            return Err(FfiError::InvalidArgument(
                "Base node address must not be empty".to_owned(),
            ));
        }
        self.with_address_handle(public_key, |public_key| {
            self.call("wallet_add_base_node_peer", |engine, wallet, err| {
                engine.wallet_add_base_node_peer(wallet, public_key, address, err)
            })
        })
    }

    /// Returns the request id echoed in the matching validation event.
    pub fn start_txo_validation(&self) -> Result<u64, FfiError> {
        self.call("wallet_start_txo_validation", |engine, wallet, err| {
            engine.wallet_start_txo_validation(wallet, err)
        })
    }

    /// Returns the request id echoed in the matching validation event.
    pub fn start_tx_validation(&self) -> Result<u64, FfiError> {
        self.call("wallet_start_tx_validation", |engine, wallet, err| {
            engine.wallet_start_tx_validation(wallet, err)
        })
    }

    pub fn restart_tx_broadcast(&self) -> Result<bool, FfiError> {
        self.call("wallet_restart_tx_broadcast", |engine, wallet, err| {
            engine.wallet_restart_tx_broadcast(wallet, err)
        })
    }

    /// Start scanning the chain for this wallet's outputs. Progress arrives
    /// as recovery events.
    pub fn start_recovery(
        &self,
        base_node: &WalletAddress,
    ) -> Result<bool, FfiError> {
        self.with_address_handle(base_node, |base_node| {
            self.call("wallet_start_recovery", |engine, wallet, err| {
                engine.wallet_start_recovery(wallet, base_node, err)
            })
        })
    }

    /// Cancel every pending tx older than `expiry` as of `now` (unix secs).
    /// Returns the ids that were cancelled.
    #[instrument(skip_all, name = "(expire-txs)")]
    pub fn cancel_expired_pending_txs(
        &self,
        now: u64,
        expiry: Duration,
    ) -> Result<Vec<TxId>, FfiError> {
        let is_expired = |timestamp: u64| {
            now.saturating_sub(timestamp) > expiry.as_secs()
        };

        let mut expired = self.txs(
            TxCollection::PendingInbound,
            |tx: &FfiPendingInboundTx| Ok((TxId(tx.id()?), tx.timestamp()?)),
        )?;
        expired.extend(self.txs(
            TxCollection::PendingOutbound,
            |tx: &FfiPendingOutboundTx| Ok((TxId(tx.id()?), tx.timestamp()?)),
        )?);
        expired.retain(|(_, timestamp)| is_expired(*timestamp));

        let mut cancelled = Vec::with_capacity(expired.len());
        for (id, timestamp) in expired {
            match self.cancel_pending_tx(id) {
                Ok(true) => {
                    info!(%id, %timestamp, "Cancelled expired pending tx");
                    cancelled.push(id);
                }
                Ok(false) => warn!(%id, "Engine declined to cancel expired tx"),
                Err(e) => warn!(%id, "Failed to cancel expired tx: {e:#}"),
            }
        }
        Ok(cancelled)
    }
}
