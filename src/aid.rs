//! Application identifiers

use std::fmt;

use crate::{Error, Result};

/// An ISO 7816 Application Identifier, 5 to 16 bytes
///
/// Equality is by content. On the wire an AID is always carried behind its
/// own length byte; [`Aid::to_length_value`] produces that form.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Aid {
    bytes: Vec<u8>,
}

impl Aid {
    /// Create an AID, validating the 5..=16 byte length constraint
    pub fn new(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = bytes.as_ref();
        if !(5..=16).contains(&bytes.len()) {
            return Err(Error::InvalidLength {
                expected: 16,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// The raw AID bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The AID length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// An AID is never empty
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Length byte followed by the AID bytes
    pub fn to_length_value(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.bytes.len());
        out.push(self.bytes.len() as u8);
        out.extend_from_slice(&self.bytes);
        out
    }
}

impl TryFrom<&[u8]> for Aid {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::new(bytes)
    }
}

impl AsRef<[u8]> for Aid {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.bytes))
    }
}

impl fmt::Debug for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aid({})", hex::encode_upper(&self.bytes))
    }
}
