//! APDU command structure and serialization
//!
//! Short-form command APDUs per ISO/IEC 7816-4: a four-byte header,
//! optionally followed by Lc and a data field, optionally followed by Le.

use bytes::{BufMut, Bytes, BytesMut};

/// A short command APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional; 0x00 means 256)
    pub le: Option<u8>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with a data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: None,
        }
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Command payload data, if any
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// The Lc value that serialization will emit (0 when there is no data)
    pub fn lc(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    /// Serialize to raw APDU bytes
    pub fn to_bytes(&self) -> Bytes {
        let data_len = self.lc();
        let mut buffer = BytesMut::with_capacity(4 + 2 + data_len);

        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(data) = &self.data {
            if !data.is_empty() {
                buffer.put_u8(data.len() as u8);
                buffer.put_slice(data);
            }
        }

        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        buffer.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_header_only() {
        let cmd = Command::new(0x80, 0xCA, 0x00, 0xE0);
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80CA00E0"));
    }

    #[test]
    fn test_data_and_le() {
        let cmd = Command::new_with_data(0x00, 0xA4, 0x04, 0x00, hex!("A000000151000000").to_vec());
        assert_eq!(cmd.to_bytes().as_ref(), hex!("00A4040008A000000151000000"));

        let cmd = cmd.with_le(0);
        assert_eq!(cmd.to_bytes().as_ref(), hex!("00A4040008A00000015100000000"));
    }

    #[test]
    fn test_le_only() {
        let cmd = Command::new(0x80, 0xCA, 0x9F, 0x7F).with_le(0);
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80CA9F7F00"));
    }

    #[test]
    fn test_empty_data_is_case_1() {
        let cmd = Command::new_with_data(0x80, 0xF2, 0x80, 0x00, Vec::new());
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80F28000"));
    }
}
