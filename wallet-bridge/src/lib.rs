//! The Rust side of the mobile wallet: a leak-free bridge to the native
//! wallet engine plus the client-side model of transaction state.
//!
//! - [`ffi`]: native handles, error slots, typed single-owner wrappers, and
//!   the [`NativeEngine`](ffi::engine::NativeEngine) boundary trait.
//! - [`callbacks`]: turns engine callbacks into [`DomainEvent`]s.
//! - [`repository`]: the transaction state machine and the merged list.
//! - [`wallet`]: the explicitly owned wallet context.
//! - [`app`]: wires everything together and runs the background tasks.
//!
//! [`DomainEvent`]: event::DomainEvent

/// The top-level app state and its background tasks.
pub mod app;
/// The cached wallet balance.
pub mod balance;
/// Engine callbacks -> typed domain events.
pub mod callbacks;
/// `BridgeConfig`, loadable from TOML.
pub mod config;
/// Domain events and the typed event bus.
pub mod event;
/// The native engine boundary.
pub mod ffi;
/// Transaction repository: state machine, merged list, recompute loop.
pub mod repository;
/// Transaction domain types.
pub mod tx;
/// Base-node sync tracking (TXO and TX validation rounds).
pub mod validation;
/// The wallet context.
pub mod wallet;
