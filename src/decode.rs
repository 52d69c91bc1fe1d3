use std::fmt::Display;
use std::string;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A payload which could not be turned into text.
///
/// These are consumed at the listener boundary and logged there;
/// they never travel through session APIs.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid UTF-8.
    #[error("Problem with UTF8 conversion")]
    Utf8(#[from] string::FromUtf8Error),

    /// The payload contains a byte outside the seven-bit range.
    #[error("Byte {byte:#04x} at offset {offset} is not ASCII")]
    NotAscii {
        /// The offending byte.
        byte: u8,

        /// Where in the payload it sits.
        offset: usize,
    },
}

/// Text encodings for inbound payloads.
///
/// Only affects the text read path; binary listeners receive
/// payloads untouched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Strict UTF-8. Invalid sequences are decode failures.
    #[default]
    Utf8,

    /// UTF-8 where invalid sequences become replacement characters.
    Utf8Lossy,

    /// Seven-bit ASCII.
    Ascii,
}

impl Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoding::Utf8 => write!(f, "utf8"),
            Encoding::Utf8Lossy => write!(f, "utf8_lossy"),
            Encoding::Ascii => write!(f, "ascii"),
        }
    }
}

/// Decode `bytes` with the given `encoding`.
///
/// A pure function so that sessions and listeners can share it
/// without sharing any state.
pub fn decode(bytes: &[u8], encoding: Encoding) -> Result<String, DecodeError> {
    match encoding {
        Encoding::Utf8 => Ok(String::from_utf8(bytes.to_vec())?),
        Encoding::Utf8Lossy => Ok(String::from_utf8_lossy(bytes).into_owned()),
        Encoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
            Some(offset) => Err(DecodeError::NotAscii {
                byte: bytes[offset],
                offset,
            }),
            None => Ok(bytes.iter().map(|b| *b as char).collect()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_strict_rejects_bad_sequences() {
        assert!(decode(b"hello", Encoding::Utf8).is_ok());
        assert!(matches!(
            decode(&[0xff, 0xfe], Encoding::Utf8),
            Err(DecodeError::Utf8(_))
        ));
    }

    #[test]
    fn utf8_lossy_always_succeeds() {
        let text = decode(&[b'o', b'k', 0xff], Encoding::Utf8Lossy).unwrap();
        assert!(text.starts_with("ok"));
    }

    #[test]
    fn ascii_reports_the_offending_byte() {
        let err = decode(&[b'a', b'b', 0xc3], Encoding::Ascii).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::NotAscii {
                byte: 0xc3,
                offset: 2
            }
        ));
    }
}
