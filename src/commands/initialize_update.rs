//! INITIALIZE UPDATE command

use crate::command::Command;
use crate::constants::{cla, ins};

/// Start a secure channel session for a key set
///
/// P1 selects the key set (0 means "first available"), P2 the key index.
pub fn initialize_update(key_set: u8, key_id: u8, host_challenge: &[u8; 8]) -> Command {
    Command::new_with_data(
        cla::GP,
        ins::INITIALIZE_UPDATE,
        key_set,
        key_id,
        host_challenge.to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_initialize_update() {
        let cmd = initialize_update(0, 0, &hex!("f0467f908e5ca23f"));
        assert_eq!(cmd.to_bytes().as_ref(), hex!("8050000008f0467f908e5ca23f"));

        let cmd = initialize_update(0x20, 0x01, &hex!("0001020304050607"));
        assert_eq!(cmd.cla, cla::GP);
        assert_eq!(cmd.p1, 0x20);
        assert_eq!(cmd.p2, 0x01);
    }
}
