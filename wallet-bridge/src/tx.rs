//! Transaction domain types. These hold copies of engine data and never own
//! a native handle.

use std::fmt;

use codec::{base58, hex};
#[cfg(any(test, feature = "test-utils"))]
use proptest_derive::Arbitrary;

use crate::ffi::{
    engine::AddressRole,
    error::FfiError,
    types::{FfiCompletedTx, FfiPendingInboundTx, FfiPendingOutboundTx, FfiTx},
};

/// The length of a wallet public key.
pub const PUBLIC_KEY_LEN: usize = 32;

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TxId(pub u128);

/// An amount in the smallest unit.
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Amount(pub u64);

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TxDirection {
    Inbound,
    Outbound,
}

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TxStatus {
    TxNullError,
    Completed,
    Broadcast,
    MinedUnconfirmed,
    Imported,
    Pending,
    Coinbase,
    MinedConfirmed,
    Rejected,
    FauxUnconfirmed,
    FauxConfirmed,
    Unknown(i32),
}

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CancellationReason {
    Unknown,
    UserCancelled,
    Timeout,
    DoubleSpend,
    Orphan,
    TimeLocked,
    InvalidTransaction,
    AbandonedCoinbase,
}

/// A wallet's public key bytes.
#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct WalletAddress(
    #[cfg_attr(
        any(test, feature = "test-utils"),
        proptest(
            strategy = "proptest::collection::vec(proptest::arbitrary::any::<u8>(), PUBLIC_KEY_LEN)"
        )
    )]
    Vec<u8>,
);

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingInboundTx {
    pub id: TxId,
    pub source_address: WalletAddress,
    pub amount: Amount,
    pub timestamp: u64,
    #[cfg_attr(any(test, feature = "test-utils"), proptest(regex = "[a-z ]{0,12}"))]
    pub message: String,
    pub status: TxStatus,
}

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PendingOutboundTx {
    pub id: TxId,
    pub destination_address: WalletAddress,
    pub amount: Amount,
    pub fee: Amount,
    pub timestamp: u64,
    #[cfg_attr(any(test, feature = "test-utils"), proptest(regex = "[a-z ]{0,12}"))]
    pub message: String,
    pub status: TxStatus,
}

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompletedTx {
    pub id: TxId,
    pub source_address: WalletAddress,
    pub destination_address: WalletAddress,
    pub amount: Amount,
    pub fee: Amount,
    pub timestamp: u64,
    #[cfg_attr(any(test, feature = "test-utils"), proptest(regex = "[a-z ]{0,12}"))]
    pub message: String,
    pub status: TxStatus,
    pub direction: TxDirection,
    pub confirmations: u64,
}

#[cfg_attr(any(test, feature = "test-utils"), derive(Arbitrary))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CancelledTx {
    pub tx: CompletedTx,
    pub reason: CancellationReason,
}

/// Any transaction, tagged by the collection it lives in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Tx {
    PendingInbound(PendingInboundTx),
    PendingOutbound(PendingOutboundTx),
    Completed(CompletedTx),
    Cancelled(CancelledTx),
}

// --- impl TxId / Amount --- //

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Amount {
    pub const ZERO: Self = Self(0);
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- impl TxStatus / CancellationReason --- //

impl TxStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            -1 => Self::TxNullError,
            0 => Self::Completed,
            1 => Self::Broadcast,
            2 => Self::MinedUnconfirmed,
            3 => Self::Imported,
            4 => Self::Pending,
            5 => Self::Coinbase,
            6 => Self::MinedConfirmed,
            7 => Self::Rejected,
            8 => Self::FauxUnconfirmed,
            9 => Self::FauxConfirmed,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::TxNullError => -1,
            Self::Completed => 0,
            Self::Broadcast => 1,
            Self::MinedUnconfirmed => 2,
            Self::Imported => 3,
            Self::Pending => 4,
            Self::Coinbase => 5,
            Self::MinedConfirmed => 6,
            Self::Rejected => 7,
            Self::FauxUnconfirmed => 8,
            Self::FauxConfirmed => 9,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_confirmed(self) -> bool {
        matches!(self, Self::MinedConfirmed | Self::FauxConfirmed)
    }
}

impl CancellationReason {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::UserCancelled,
            2 => Self::Timeout,
            3 => Self::DoubleSpend,
            4 => Self::Orphan,
            5 => Self::TimeLocked,
            6 => Self::InvalidTransaction,
            7 => Self::AbandonedCoinbase,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::UserCancelled => 1,
            Self::Timeout => 2,
            Self::DoubleSpend => 3,
            Self::Orphan => 4,
            Self::TimeLocked => 5,
            Self::InvalidTransaction => 6,
            Self::AbandonedCoinbase => 7,
        }
    }
}

// --- impl WalletAddress --- //

impl WalletAddress {
    /// Wrap bytes read from the engine. The engine is trusted to hand back
    /// well-formed keys, so the length isn't checked here.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parse a hex-encoded public key entered by the user.
    pub fn from_hex(s: &str) -> Result<Self, FfiError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| FfiError::InvalidArgument(format!("{e}")))?;
        Self::from_user_bytes(bytes)
    }

    /// Parse a base58-encoded public key entered by the user.
    pub fn from_base58(s: &str) -> Result<Self, FfiError> {
        let bytes = base58::decode(s.trim())
            .map_err(|e| FfiError::InvalidArgument(format!("{e}")))?;
        Self::from_user_bytes(bytes)
    }

    fn from_user_bytes(bytes: Vec<u8>) -> Result<Self, FfiError> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(FfiError::InvalidArgument(format!(
                "Expected a {PUBLIC_KEY_LEN} byte public key, got {} bytes",
                bytes.len(),
            )));
        }
        Ok(Self(bytes))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn to_base58(&self) -> String {
        base58::encode(&self.0)
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::display(&self.0))
    }
}

// --- Reading from the engine --- //

impl PendingInboundTx {
    pub(crate) fn read(tx: &FfiPendingInboundTx) -> Result<Self, FfiError> {
        Ok(Self {
            id: TxId(tx.id()?),
            source_address: WalletAddress(
                tx.address_bytes(AddressRole::Source)?,
            ),
            amount: Amount(tx.amount()?),
            timestamp: tx.timestamp()?,
            message: tx.message()?,
            status: TxStatus::from_code(tx.status()?),
        })
    }
}

impl PendingOutboundTx {
    pub(crate) fn read(tx: &FfiPendingOutboundTx) -> Result<Self, FfiError> {
        Ok(Self {
            id: TxId(tx.id()?),
            destination_address: WalletAddress(
                tx.address_bytes(AddressRole::Destination)?,
            ),
            amount: Amount(tx.amount()?),
            fee: Amount(tx.fee()?),
            timestamp: tx.timestamp()?,
            message: tx.message()?,
            status: TxStatus::from_code(tx.status()?),
        })
    }
}

impl CompletedTx {
    pub(crate) fn read(tx: &FfiCompletedTx) -> Result<Self, FfiError> {
        let direction = if tx.is_outbound()? {
            TxDirection::Outbound
        } else {
            TxDirection::Inbound
        };
        Ok(Self {
            id: TxId(tx.id()?),
            source_address: WalletAddress(
                tx.address_bytes(AddressRole::Source)?,
            ),
            destination_address: WalletAddress(
                tx.address_bytes(AddressRole::Destination)?,
            ),
            amount: Amount(tx.amount()?),
            fee: Amount(tx.fee()?),
            timestamp: tx.timestamp()?,
            message: tx.message()?,
            status: TxStatus::from_code(tx.status()?),
            direction,
            confirmations: tx.confirmations()?,
        })
    }
}

impl CancelledTx {
    pub(crate) fn read(tx: &FfiCompletedTx) -> Result<Self, FfiError> {
        Ok(Self {
            tx: CompletedTx::read(tx)?,
            reason: CancellationReason::from_code(tx.cancellation_reason()?),
        })
    }
}

// --- impl Tx --- //

impl Tx {
    pub fn id(&self) -> TxId {
        match self {
            Self::PendingInbound(tx) => tx.id,
            Self::PendingOutbound(tx) => tx.id,
            Self::Completed(tx) => tx.id,
            Self::Cancelled(tx) => tx.tx.id,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Self::PendingInbound(tx) => tx.timestamp,
            Self::PendingOutbound(tx) => tx.timestamp,
            Self::Completed(tx) => tx.timestamp,
            Self::Cancelled(tx) => tx.tx.timestamp,
        }
    }

    pub fn status(&self) -> TxStatus {
        match self {
            Self::PendingInbound(tx) => tx.status,
            Self::PendingOutbound(tx) => tx.status,
            Self::Completed(tx) => tx.status,
            Self::Cancelled(tx) => tx.tx.status,
        }
    }

    pub fn amount(&self) -> Amount {
        match self {
            Self::PendingInbound(tx) => tx.amount,
            Self::PendingOutbound(tx) => tx.amount,
            Self::Completed(tx) => tx.amount,
            Self::Cancelled(tx) => tx.tx.amount,
        }
    }

    pub fn direction(&self) -> TxDirection {
        match self {
            Self::PendingInbound(_) => TxDirection::Inbound,
            Self::PendingOutbound(_) => TxDirection::Outbound,
            Self::Completed(tx) => tx.direction,
            Self::Cancelled(tx) => tx.tx.direction,
        }
    }
}
