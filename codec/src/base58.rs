//! Base58 with the bitcoin alphabet. Leading zero bytes are encoded as
//! leading `'1'`s so they survive a round trip.

use thiserror::Error;

#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum DecodeError {
    #[error("base58 decode error: invalid character {character:?} at {index}")]
    InvalidCharacter { character: char, index: usize },
    #[error("base58 decode error: non-ascii character at {index}")]
    NonAsciiCharacter { index: usize },
    #[error("base58 decode error: malformed input")]
    Malformed,
}

impl From<bs58::decode::Error> for DecodeError {
    fn from(err: bs58::decode::Error) -> Self {
        match err {
            bs58::decode::Error::InvalidCharacter { character, index } =>
                Self::InvalidCharacter { character, index },
            bs58::decode::Error::NonAsciiCharacter { index } =>
                Self::NonAsciiCharacter { index },
            _ => Self::Malformed,
        }
    }
}

/// Encode bytes as a base58 string.
#[inline]
pub fn encode(input: &[u8]) -> String {
    bs58::encode(input).into_string()
}

/// Decode a base58 string into bytes.
pub fn decode(input: &str) -> Result<Vec<u8>, DecodeError> {
    bs58::decode(input).into_vec().map_err(DecodeError::from)
}

#[cfg(test)]
mod test {
    use proptest::{arbitrary::any, collection::vec, prop_assert_eq, proptest};

    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"Hello World"), "JxF12TrwUP45BMd");
        assert_eq!(encode(&[0, 0, 0, 1]), "1112");
        assert_eq!(encode(&[0x00, 0x00]), "11");
        assert_eq!(decode("JxF12TrwUP45BMd").unwrap(), b"Hello World");
        assert_eq!(decode("1112").unwrap(), [0u8, 0, 0, 1]);
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn rejects_characters_outside_alphabet() {
        // '0', 'O', 'I', and 'l' are excluded to avoid visual ambiguity.
        for (input, character, index) in
            [("1O", 'O', 1), ("0", '0', 0), ("abIc", 'I', 2)]
        {
            assert_eq!(
                decode(input),
                Err(DecodeError::InvalidCharacter { character, index })
            );
        }
        assert_eq!(
            decode("é"),
            Err(DecodeError::NonAsciiCharacter { index: 0 })
        );
    }

    #[test]
    fn roundtrip() {
        proptest!(|(bytes in vec(any::<u8>(), 0..48))| {
            let encoded = encode(&bytes);
            prop_assert_eq!(decode(&encoded).unwrap(), bytes);
        });
    }
}
