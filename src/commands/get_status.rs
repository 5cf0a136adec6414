//! GET STATUS command

use crate::command::Command;
use crate::constants::{cla, ins, tags};

/// Query one registry category; P2 selects first or continuation part
///
/// The data field is the wildcard AID filter.
pub fn get_status(p1: u8, p2: u8) -> Command {
    Command::new_with_data(cla::GP, ins::GET_STATUS, p1, p2, vec![tags::AID, 0x00])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{get_status_p1, get_status_p2};
    use hex_literal::hex;

    #[test]
    fn test_get_status() {
        let cmd = get_status(get_status_p1::APPLICATIONS, get_status_p2::FIRST);
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80F24000024F00"));

        let cmd = get_status(get_status_p1::APPLICATIONS, get_status_p2::NEXT);
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80F24001024F00"));
    }
}
