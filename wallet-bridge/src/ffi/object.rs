use std::sync::Arc;

use tracing::{debug, warn};

use crate::ffi::{
    engine::NativeEngine,
    error::{ErrorSlot, FfiError, checked},
    handle::{NativeHandle, ObjectKind},
};

/// Owns exactly one native handle until [`destroy`] is called.
///
/// - `Live -> Released` happens once; later [`destroy`] calls are no-ops.
/// - Using a released wrapper is a bug: it panics in debug builds and returns
///   [`FfiError::StaleWrapperAccess`] otherwise.
/// - `Drop` releases a still-live handle, but logs a warning since the owner
///   should have released it deterministically.
///
/// [`destroy`]: Self::destroy
pub struct FfiObject {
    engine: Arc<dyn NativeEngine>,
    kind: ObjectKind,
    handle: NativeHandle,
}

/// A typed wrapper around an [`FfiObject`] of a specific [`ObjectKind`].
pub trait FfiType: Sized {
    const KIND: ObjectKind;

    fn from_object(object: FfiObject) -> Self;
    fn object(&self) -> &FfiObject;
    fn object_mut(&mut self) -> &mut FfiObject;

    /// Take ownership of `handle`, which was returned by the native `call`.
    fn wrap(
        engine: &Arc<dyn NativeEngine>,
        call: &'static str,
        handle: NativeHandle,
    ) -> Result<Self, FfiError> {
        FfiObject::wrap(engine, Self::KIND, call, handle).map(Self::from_object)
    }

    #[inline]
    fn destroy(&mut self) {
        self.object_mut().destroy()
    }

    #[inline]
    fn is_released(&self) -> bool {
        self.object().is_released()
    }
}

/// Run `f` with `object`, then release `object` regardless of the outcome.
/// If `f` panics, `Drop` releases it during unwinding.
pub fn with_destroy<T: FfiType, R>(mut object: T, f: impl FnOnce(&T) -> R) -> R {
    let result = f(&object);
    object.destroy();
    result
}

impl FfiObject {
    pub(crate) fn wrap(
        engine: &Arc<dyn NativeEngine>,
        kind: ObjectKind,
        call: &'static str,
        handle: NativeHandle,
    ) -> Result<Self, FfiError> {
        if handle.is_null() {
            return Err(FfiError::NullHandle { call, kind });
        }
        Ok(Self {
            engine: engine.clone(),
            kind,
            handle,
        })
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    #[inline]
    pub fn engine(&self) -> &Arc<dyn NativeEngine> {
        &self.engine
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.handle.is_null()
    }

    /// The live handle.
    pub fn handle(&self) -> Result<NativeHandle, FfiError> {
        debug_assert!(
            !self.is_released(),
            "Used a {} wrapper after it was released",
            self.kind,
        );
        if self.is_released() {
            return Err(FfiError::StaleWrapperAccess { kind: self.kind });
        }
        Ok(self.handle)
    }

    /// Release the native object. Idempotent.
    pub fn destroy(&mut self) {
        if self.is_released() {
            return;
        }
        let handle = std::mem::replace(&mut self.handle, NativeHandle::NULL);
        self.engine.destroy(self.kind, handle);
    }

    /// Make a checked native call against the live handle.
    pub(crate) fn call<T>(
        &self,
        call: &'static str,
        f: impl FnOnce(&dyn NativeEngine, NativeHandle, &mut ErrorSlot) -> T,
    ) -> Result<T, FfiError> {
        let handle = self.handle()?;
        checked(call, |err| f(self.engine.as_ref(), handle, err))
    }

    /// Like [`call`](Self::call), but the call returns a new owned handle
    /// which is wrapped as `T`.
    pub(crate) fn call_wrap<T: FfiType>(
        &self,
        call: &'static str,
        f: impl FnOnce(&dyn NativeEngine, NativeHandle, &mut ErrorSlot) -> NativeHandle,
    ) -> Result<T, FfiError> {
        let handle = self.call(call, f)?;
        T::wrap(&self.engine, call, handle)
    }
}

impl Drop for FfiObject {
    fn drop(&mut self) {
        if self.is_released() {
            return;
        }
        // Releasing during a panic is expected; anything else is a leak the
        // owner should have handled.
        if std::thread::panicking() {
            debug!(kind = %self.kind, "Releasing wrapper while unwinding");
        } else {
            warn!(kind = %self.kind, "Wrapper dropped without destroy()");
        }
        self.destroy();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ffi::{mock::MockEngine, types::FfiBalance};

    fn engine() -> (Arc<MockEngine>, Arc<dyn NativeEngine>) {
        let mock = Arc::new(MockEngine::new());
        let engine: Arc<dyn NativeEngine> = mock.clone();
        (mock, engine)
    }

    #[test]
    fn destroy_twice_is_a_noop() {
        let (mock, engine) = engine();
        let handle = mock.alloc_balance([1, 2, 3, 4]);
        let mut balance = FfiBalance::wrap(&engine, "test", handle).unwrap();
        assert_eq!(mock.live_handles(), 1);

        balance.destroy();
        assert!(balance.is_released());
        balance.destroy();
        assert_eq!(mock.live_handles(), 0);
        assert_eq!(mock.destroy_count(), 1);
    }

    #[test]
    fn null_handle_is_rejected() {
        let (mock, engine) = engine();
        let result = FfiBalance::wrap(&engine, "wallet_get_balance", NativeHandle::NULL);
        assert_eq!(
            result.err(),
            Some(FfiError::NullHandle {
                call: "wallet_get_balance",
                kind: ObjectKind::Balance,
            })
        );
        assert_eq!(mock.destroy_count(), 0);
    }

    #[test]
    fn with_destroy_releases_on_error() {
        let (mock, engine) = engine();
        let handle = mock.alloc_balance([1, 2, 3, 4]);
        let balance = FfiBalance::wrap(&engine, "test", handle).unwrap();

        let result: Result<(), FfiError> = with_destroy(balance, |_| {
            Err(FfiError::InvalidArgument("nope".to_owned()))
        });
        assert!(result.is_err());
        assert_eq!(mock.live_handles(), 0);
    }

    #[test]
    fn drop_backstop_releases() {
        let (mock, engine) = engine();
        let handle = mock.alloc_balance([1, 2, 3, 4]);
        let balance = FfiBalance::wrap(&engine, "test", handle).unwrap();
        drop(balance);
        assert_eq!(mock.live_handles(), 0);
    }

    #[test]
    fn with_destroy_releases_on_panic() {
        let (mock, engine) = engine();
        let handle = mock.alloc_balance([1, 2, 3, 4]);
        let balance = FfiBalance::wrap(&engine, "test", handle).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
            || with_destroy(balance, |_| panic!("boom")),
        ));
        assert!(result.is_err());
        assert_eq!(mock.live_handles(), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "after it was released")]
    fn stale_access_panics_in_debug() {
        let (mock, engine) = engine();
        let handle = mock.alloc_balance([1, 2, 3, 4]);
        let mut balance = FfiBalance::wrap(&engine, "test", handle).unwrap();
        balance.destroy();
        let _ = balance.available();
    }
}
