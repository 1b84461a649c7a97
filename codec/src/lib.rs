//! Text encodings for wallet ids, keys, and addresses.
//!
//! - [`hex`]: lowercase base16, used for public keys and debug output.
//! - [`base58`]: the bitcoin base58 alphabet, used for user-facing addresses.

/// Base58 encode/decode with the bitcoin alphabet.
pub mod base58;
/// Lowercase hex encode/decode/display.
pub mod hex;
