//! APDU responses and status words
//!
//! A response APDU is a (possibly empty) data body followed by the two
//! status-word bytes SW1 SW2.

use std::fmt;

use bytes::Bytes;

use crate::{Error, Result};

/// Two-byte status word trailing every response APDU
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte
    pub sw1: u8,
    /// Second status byte
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word from its two bytes
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// The status word as a 16-bit value (SW1 in the high byte)
    pub const fn to_u16(self) -> u16 {
        ((self.sw1 as u16) << 8) | self.sw2 as u16
    }

    /// Whether this is the success status 9000
    pub const fn is_success(self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }
}

impl From<u16> for StatusWord {
    fn from(sw: u16) -> Self {
        Self::new((sw >> 8) as u8, (sw & 0xFF) as u8)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}", self.sw1, self.sw2)
    }
}

impl fmt::Debug for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusWord({:02X}{:02X})", self.sw1, self.sw2)
    }
}

/// A parsed response APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    data: Bytes,
    status: StatusWord,
}

impl Response {
    /// Create a response from a data body and a status word
    pub fn new(data: impl Into<Bytes>, status: StatusWord) -> Self {
        Self {
            data: data.into(),
            status,
        }
    }

    /// Parse a raw response, which must be at least the two status bytes
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < 2 {
            return Err(Error::InvalidResponse("response shorter than a status word"));
        }
        let (data, sw) = raw.split_at(raw.len() - 2);
        Ok(Self {
            data: Bytes::copy_from_slice(data),
            status: StatusWord::new(sw[0], sw[1]),
        })
    }

    /// The response body, without the status word
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Whether the status word is 9000
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Map a non-9000 status to a command error for the named operation
    pub fn require_success(&self, operation: &'static str) -> Result<&[u8]> {
        if self.is_success() {
            Ok(self.data())
        } else {
            Err(Error::CardStatus {
                operation,
                status: self.status,
            })
        }
    }

    /// Serialize back to body ‖ SW1 ‖ SW2
    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::with_capacity(self.data.len() + 2);
        out.extend_from_slice(&self.data);
        out.push(self.status.sw1);
        out.push(self.status.sw2);
        Bytes::from(out)
    }
}
