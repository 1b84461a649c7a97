use std::fmt::{self, Write};

use thiserror::Error;

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// Errors which can be produced while decoding a hex string.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum DecodeError {
    #[error("hex decode error: expected {expected} bytes, got {actual}")]
    BadLength { expected: usize, actual: usize },
    #[error("hex decode error: invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("hex decode error: input string length must be even")]
    OddInputLength,
}

/// Convert a byte slice to an owned lowercase hex string. To only display
/// bytes as hex, use [`display`], which avoids the allocation.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX_CHARS[usize::from(byte >> 4)] as char);
        out.push(HEX_CHARS[usize::from(byte & 0x0f)] as char);
    }
    out
}

/// Decode a hex string to owned bytes. Accepts upper and lower case.
pub fn decode(hex: &str) -> Result<Vec<u8>, DecodeError> {
    let hex = hex.as_bytes();
    if hex.len() % 2 != 0 {
        return Err(DecodeError::OddInputLength);
    }

    hex.chunks_exact(2)
        .map(|pair| -> Result<u8, DecodeError> {
            Ok((decode_nibble(pair[0])? << 4) | decode_nibble(pair[1])?)
        })
        .collect()
}

/// Provides `Debug` and `Display` impls which render the bytes as hex.
#[inline]
pub fn display(bytes: &[u8]) -> HexDisplay<'_> {
    HexDisplay(bytes)
}

/// A trait to deserialize something from a hex-encoded string slice.
///
/// ```
/// use codec::hex::FromHex;
/// let key = <[u8; 4]>::from_hex("deadbeef").unwrap();
/// assert_eq!(key, [0xde, 0xad, 0xbe, 0xef]);
/// ```
pub trait FromHex: Sized {
    fn from_hex(s: &str) -> Result<Self, DecodeError>;
}

impl FromHex for Vec<u8> {
    fn from_hex(s: &str) -> Result<Self, DecodeError> {
        decode(s)
    }
}

impl<const N: usize> FromHex for [u8; N] {
    fn from_hex(s: &str) -> Result<Self, DecodeError> {
        let bytes = decode(s)?;
        <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| {
            DecodeError::BadLength {
                expected: N,
                actual: bytes.len(),
            }
        })
    }
}

pub struct HexDisplay<'a>(&'a [u8]);

impl fmt::Display for HexDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            f.write_char(HEX_CHARS[usize::from(byte >> 4)] as char)?;
            f.write_char(HEX_CHARS[usize::from(byte & 0x0f)] as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexDisplay<'_> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

fn decode_nibble(c: u8) -> Result<u8, DecodeError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(DecodeError::InvalidCharacter(char::from(c))),
    }
}

#[cfg(test)]
mod test {
    use proptest::{arbitrary::any, collection::vec, prop_assert_eq, proptest};

    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(encode(&[]), "");
        let bytes = [0x01_u8, 0x34, 0x89, 0x00, 0xab, 0xff];
        assert_eq!(encode(&bytes), "01348900abff");
        assert_eq!(decode("01348900ABff").unwrap(), bytes);
    }

    #[test]
    fn decode_errors() {
        assert_eq!(decode("abc"), Err(DecodeError::OddInputLength));
        assert_eq!(decode("zz"), Err(DecodeError::InvalidCharacter('z')));
        assert_eq!(
            <[u8; 3]>::from_hex("0102"),
            Err(DecodeError::BadLength {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn roundtrip_and_display_agree() {
        proptest!(|(bytes in vec(any::<u8>(), 0..64))| {
            let hex = encode(&bytes);
            prop_assert_eq!(&hex, &display(&bytes).to_string());
            prop_assert_eq!(decode(&hex).unwrap(), bytes);
        });
    }
}
