//! Typed wrappers for each kind of native object. Accessors make one checked
//! native call each and return owned Rust values, or new owned wrappers for
//! calls that return handles.

use num_bigint::BigUint;

use crate::ffi::{
    engine::{AddressRole, BalanceField, TxField},
    error::FfiError,
    handle::ObjectKind,
    iterable::FfiElement,
    object::{FfiObject, FfiType, with_destroy},
};

macro_rules! ffi_type {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        pub struct $name(FfiObject);

        impl FfiType for $name {
            const KIND: ObjectKind = $kind;

            #[inline]
            fn from_object(object: FfiObject) -> Self {
                Self(object)
            }
            #[inline]
            fn object(&self) -> &FfiObject {
                &self.0
            }
            #[inline]
            fn object_mut(&mut self) -> &mut FfiObject {
                &mut self.0
            }
        }
    };
}

ffi_type!(
    /// The engine's wallet instance.
    FfiWallet,
    ObjectKind::Wallet
);
ffi_type!(FfiCompletedTx, ObjectKind::CompletedTx);
ffi_type!(FfiPendingInboundTx, ObjectKind::PendingInboundTx);
ffi_type!(FfiPendingOutboundTx, ObjectKind::PendingOutboundTx);
ffi_type!(FfiBalance, ObjectKind::Balance);
ffi_type!(FfiWalletAddress, ObjectKind::WalletAddress);
ffi_type!(
    /// A native byte array, used for address and key material.
    FfiByteVector,
    ObjectKind::ByteVector
);
ffi_type!(FfiContact, ObjectKind::Contact);

impl FfiElement for FfiCompletedTx {
    const VECTOR_KIND: ObjectKind = ObjectKind::CompletedTxVector;
}
impl FfiElement for FfiPendingInboundTx {
    const VECTOR_KIND: ObjectKind = ObjectKind::PendingInboundTxVector;
}
impl FfiElement for FfiPendingOutboundTx {
    const VECTOR_KIND: ObjectKind = ObjectKind::PendingOutboundTxVector;
}
impl FfiElement for FfiContact {
    const VECTOR_KIND: ObjectKind = ObjectKind::ContactVector;
}

/// Decode unsigned big-endian bytes from `call` into a `u128`.
pub(crate) fn be_u128(call: &'static str, bytes: &[u8]) -> Result<u128, FfiError> {
    u128::try_from(&BigUint::from_bytes_be(bytes))
        .map_err(|_| FfiError::Overflow { call })
}

/// Decode unsigned big-endian bytes from `call` into a `u64`.
pub(crate) fn be_u64(call: &'static str, bytes: &[u8]) -> Result<u64, FfiError> {
    u64::try_from(&BigUint::from_bytes_be(bytes))
        .map_err(|_| FfiError::Overflow { call })
}

/// Accessors shared by all three transaction kinds.
pub trait FfiTx: FfiType {
    fn id(&self) -> Result<u128, FfiError> {
        let bytes = self.field("tx_get_id", TxField::Id)?;
        be_u128("tx_get_id", &bytes)
    }

    fn amount(&self) -> Result<u64, FfiError> {
        let bytes = self.field("tx_get_amount", TxField::Amount)?;
        be_u64("tx_get_amount", &bytes)
    }

    fn timestamp(&self) -> Result<u64, FfiError> {
        let bytes = self.field("tx_get_timestamp", TxField::Timestamp)?;
        be_u64("tx_get_timestamp", &bytes)
    }

    fn message(&self) -> Result<String, FfiError> {
        self.object().call("tx_get_message", |engine, tx, err| {
            engine.tx_get_message(Self::KIND, tx, err)
        })
    }

    fn status(&self) -> Result<i32, FfiError> {
        self.object().call("tx_get_status", |engine, tx, err| {
            engine.tx_get_status(Self::KIND, tx, err)
        })
    }

    fn field(
        &self,
        call: &'static str,
        field: TxField,
    ) -> Result<Vec<u8>, FfiError> {
        self.object().call(call, |engine, tx, err| {
            engine.tx_get_field(Self::KIND, tx, field, err)
        })
    }

    /// Read an address out of the tx, releasing the intermediate wrappers.
    fn address_bytes(&self, role: AddressRole) -> Result<Vec<u8>, FfiError> {
        let address = self.object().call_wrap::<FfiWalletAddress>(
            "tx_get_address",
            |engine, tx, err| engine.tx_get_address(Self::KIND, tx, role, err),
        )?;
        with_destroy(address, FfiWalletAddress::bytes)
    }
}

impl FfiTx for FfiCompletedTx {}
impl FfiTx for FfiPendingInboundTx {}
impl FfiTx for FfiPendingOutboundTx {}

impl FfiCompletedTx {
    pub fn fee(&self) -> Result<u64, FfiError> {
        let bytes = self.field("tx_get_fee", TxField::Fee)?;
        be_u64("tx_get_fee", &bytes)
    }

    pub fn is_outbound(&self) -> Result<bool, FfiError> {
        self.0.call("completed_tx_is_outbound", |engine, tx, err| {
            engine.completed_tx_is_outbound(tx, err)
        })
    }

    pub fn confirmations(&self) -> Result<u64, FfiError> {
        self.0.call("completed_tx_confirmations", |engine, tx, err| {
            engine.completed_tx_confirmations(tx, err)
        })
    }

    pub fn cancellation_reason(&self) -> Result<i32, FfiError> {
        self.0
            .call("completed_tx_cancellation_reason", |engine, tx, err| {
                engine.completed_tx_cancellation_reason(tx, err)
            })
    }
}

impl FfiPendingOutboundTx {
    pub fn fee(&self) -> Result<u64, FfiError> {
        let bytes = self.field("tx_get_fee", TxField::Fee)?;
        be_u64("tx_get_fee", &bytes)
    }
}

impl FfiBalance {
    fn get(&self, field: BalanceField) -> Result<u64, FfiError> {
        let bytes = self.0.call("balance_get", |engine, balance, err| {
            engine.balance_get(balance, field, err)
        })?;
        be_u64("balance_get", &bytes)
    }

    pub fn available(&self) -> Result<u64, FfiError> {
        self.get(BalanceField::Available)
    }
    pub fn pending_incoming(&self) -> Result<u64, FfiError> {
        self.get(BalanceField::PendingIncoming)
    }
    pub fn pending_outgoing(&self) -> Result<u64, FfiError> {
        self.get(BalanceField::PendingOutgoing)
    }
    pub fn time_locked(&self) -> Result<u64, FfiError> {
        self.get(BalanceField::TimeLocked)
    }
}

impl FfiWalletAddress {
    pub fn bytes(&self) -> Result<Vec<u8>, FfiError> {
        let bytes = self
            .0
            .call_wrap::<FfiByteVector>("address_get_bytes", |engine, a, err| {
                engine.address_get_bytes(a, err)
            })?;
        with_destroy(bytes, FfiByteVector::to_vec)
    }
}

impl FfiByteVector {
    pub fn to_vec(&self) -> Result<Vec<u8>, FfiError> {
        let len = self.0.call("byte_vector_len", |engine, bytes, err| {
            engine.byte_vector_len(bytes, err)
        })?;
        (0..len)
            .map(|index| {
                self.0.call("byte_vector_get_at", |engine, bytes, err| {
                    engine.byte_vector_get_at(bytes, index, err)
                })
            })
            .collect()
    }
}

impl FfiContact {
    pub fn alias(&self) -> Result<String, FfiError> {
        self.0.call("contact_get_alias", |engine, contact, err| {
            engine.contact_get_alias(contact, err)
        })
    }

    pub fn address_bytes(&self) -> Result<Vec<u8>, FfiError> {
        let address = self.0.call_wrap::<FfiWalletAddress>(
            "contact_get_address",
            |engine, contact, err| engine.contact_get_address(contact, err),
        )?;
        with_destroy(address, FfiWalletAddress::bytes)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::ffi::{engine::NativeEngine, mock::MockEngine};

    #[test]
    fn big_endian_range_checks() {
        assert_eq!(be_u64("t", &[]), Ok(0));
        assert_eq!(be_u64("t", &[0x01, 0x00]), Ok(256));
        // Leading zeroes don't count against the width
        let mut padded = vec![0u8; 8];
        padded.extend_from_slice(&u64::MAX.to_be_bytes());
        assert_eq!(be_u64("t", &padded), Ok(u64::MAX));
        assert_eq!(
            be_u64("t", &[1, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(FfiError::Overflow { call: "t" })
        );
        assert_eq!(be_u128("t", &u128::MAX.to_be_bytes()), Ok(u128::MAX));
    }

    #[test]
    fn reads_release_intermediate_handles() {
        let mock = Arc::new(MockEngine::new());
        let engine: Arc<dyn NativeEngine> = mock.clone();
        let tx = MockEngine::completed_tx(7, 1000, true);
        let handle = mock.alloc_completed_tx(tx.clone());

        let wrapper = FfiCompletedTx::wrap(&engine, "test", handle).unwrap();
        let (id, source) = with_destroy(wrapper, |tx| {
            Ok::<_, FfiError>((
                tx.id()?,
                tx.address_bytes(AddressRole::Source)?,
            ))
        })
        .unwrap();

        assert_eq!(id, 7);
        assert_eq!(source, tx.source_address.as_bytes());
        assert_eq!(mock.live_handles(), 0);
    }
}
