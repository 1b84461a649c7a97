//! Utilities and extensions built on top of Tokio.

/// Exponential backoff durations for retry loops.
pub mod backoff;
/// Wraps a mpmc [`tokio::sync::broadcast`] to provide a typed events bus.
pub mod events_bus;
/// A channel for sending coalesced notifications with no data attached.
pub mod notify;
/// `NotifyOnce`, typically used as a shutdown channel.
pub mod notify_once;
/// `LxTask` and associated helpers.
pub mod task;

// Default sizes for Tokio channels
pub const DEFAULT_CHANNEL_SIZE: usize = 256;
pub const SMALLER_CHANNEL_SIZE: usize = 16;
