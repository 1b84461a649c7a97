//! The native wallet engine boundary.
//!
//! Every object the engine hands us is a [`NativeHandle`] which must be
//! released exactly once. Handles never escape this module unwrapped: they
//! are immediately owned by an [`FfiObject`] inside one of the typed wrappers
//! in [`types`], and released via [`FfiObject::destroy`] or [`with_destroy`].
//!
//! [`NativeHandle`]: handle::NativeHandle
//! [`FfiObject`]: object::FfiObject
//! [`FfiObject::destroy`]: object::FfiObject::destroy
//! [`with_destroy`]: object::with_destroy

/// The `NativeEngine` and `WalletCallbacks` traits.
pub mod engine;
/// `ErrorSlot`, `FfiError`, and user-facing error mapping.
pub mod error;
/// `NativeHandle` and `ObjectKind`.
pub mod handle;
/// `FfiVector` and `find_in_iterable`.
pub mod iterable;
/// An in-memory `NativeEngine` for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
/// `FfiObject`, the `FfiType` trait, and `with_destroy`.
pub mod object;
/// Bindings to the native engine library.
#[cfg(feature = "sys")]
pub mod sys;
/// Typed wrappers for each kind of native object.
pub mod types;
