use std::fmt;

/// An opaque reference to an engine-owned object. Never dereferenced on our
/// side; only passed back into the engine or compared against [`NULL`].
///
/// [`NULL`]: NativeHandle::NULL
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NativeHandle(pub u64);

impl NativeHandle {
    pub const NULL: Self = Self(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The kind of native object behind a handle. The engine needs this to pick
/// the right destructor and accessors.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, strum::Display)]
pub enum ObjectKind {
    Wallet,
    CompletedTx,
    PendingInboundTx,
    PendingOutboundTx,
    Balance,
    WalletAddress,
    ByteVector,
    Contact,
    CompletedTxVector,
    PendingInboundTxVector,
    PendingOutboundTxVector,
    ContactVector,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn null_sentinel() {
        assert!(NativeHandle::NULL.is_null());
        assert!(!NativeHandle(42).is_null());
        assert_eq!(NativeHandle(255).to_string(), "0xff");
        assert_eq!(ObjectKind::PendingInboundTx.to_string(), "PendingInboundTx");
    }
}
