use thiserror::Error;

use crate::ffi::handle::ObjectKind;

/// The out-parameter every fallible native call writes its result code into.
/// Zero means success.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorSlot {
    pub code: i32,
    pub message: Option<String>,
}

/// Errors from calls across the native boundary.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FfiError {
    #[error(
        "{call} failed with code {code}: {}",
        .message.as_deref().unwrap_or("(no message)")
    )]
    CallFailed {
        call: &'static str,
        code: i32,
        message: Option<String>,
    },

    #[error("{call} returned a null {kind} handle")]
    NullHandle {
        call: &'static str,
        kind: ObjectKind,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Used a {kind} wrapper after it was released")]
    StaleWrapperAccess { kind: ObjectKind },

    #[error("{call} returned an integer that doesn't fit its type")]
    Overflow { call: &'static str },
}

/// What the user gets to see. Native codes never leak through here.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum UserFacingError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Something went wrong, please try again")]
    Failed,
}

impl ErrorSlot {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }

    /// Used by engines to report a failure.
    pub fn set(&mut self, code: i32, message: impl Into<String>) {
        self.code = code;
        self.message = Some(message.into());
    }

    /// Convert a non-zero code into [`FfiError::CallFailed`].
    pub fn into_result(self, call: &'static str) -> Result<(), FfiError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(FfiError::CallFailed {
                call,
                code: self.code,
                message: self.message,
            })
        }
    }
}

impl FfiError {
    /// Whether this is a [`FfiError::CallFailed`] with the given engine code.
    pub fn is_code(&self, expected: i32) -> bool {
        matches!(self, Self::CallFailed { code, .. } if *code == expected)
    }

    pub fn user_facing(&self) -> UserFacingError {
        match self {
            Self::InvalidArgument(msg) =>
                UserFacingError::InvalidInput(msg.clone()),
            _ => UserFacingError::Failed,
        }
    }
}

/// Run a native call with a fresh [`ErrorSlot`], checking the slot before the
/// return value is looked at. On failure the returned value is dropped
/// without being wrapped, so any handle it carries is never released by us.
pub(crate) fn checked<T>(
    call: &'static str,
    f: impl FnOnce(&mut ErrorSlot) -> T,
) -> Result<T, FfiError> {
    let mut err = ErrorSlot::new();
    let value = f(&mut err);
    err.into_result(call).map(|()| value)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checked_fails_before_looking_at_value() {
        let result = checked("wallet_get_balance", |err| {
            err.set(404, "no balance");
            7u64
        });
        assert_eq!(
            result,
            Err(FfiError::CallFailed {
                call: "wallet_get_balance",
                code: 404,
                message: Some("no balance".to_owned()),
            })
        );
        assert!(result.unwrap_err().is_code(404));

        assert_eq!(checked("ok", |_| 7u64), Ok(7));
    }

    #[test]
    fn user_facing_hides_native_details() {
        let err = FfiError::InvalidArgument("fee below minimum".to_owned());
        assert_eq!(
            err.user_facing(),
            UserFacingError::InvalidInput("fee below minimum".to_owned())
        );

        let err = FfiError::CallFailed {
            call: "wallet_send_tx",
            code: 1,
            message: None,
        };
        assert_eq!(err.user_facing(), UserFacingError::Failed);
        assert!(!err.user_facing().to_string().contains("wallet_send_tx"));
        assert_eq!(
            err.to_string(),
            "wallet_send_tx failed with code 1: (no message)"
        );
    }
}
