//! GET DATA command

use crate::command::Command;
use crate::constants::{cla, ins};

/// Read a data object; P1/P2 form the tag
pub fn get_data(p1: u8, p2: u8) -> Command {
    Command::new(cla::GP, ins::GET_DATA, p1, p2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_get_data() {
        let cmd = get_data(0x00, 0xE0);
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80CA00E0"));

        let cmd = get_data(0x9F, 0x7F).with_le(0);
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80CA9F7F00"));
    }
}
