//! DELETE command

use crate::aid::Aid;
use crate::command::Command;
use crate::constants::{cla, delete_p2, ins, tags};

/// Delete a card object, optionally cascading to its dependents
pub fn delete_object(aid: &Aid, and_related: bool) -> Command {
    let mut data = Vec::with_capacity(2 + aid.len());
    data.push(tags::AID);
    data.extend_from_slice(&aid.to_length_value());

    let p2 = if and_related {
        delete_p2::OBJECT_AND_RELATED
    } else {
        delete_p2::OBJECT
    };
    Command::new_with_data(cla::GP, ins::DELETE, 0x00, p2, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_delete_object() {
        let aid = Aid::new(hex!("0102030405")).unwrap();
        let cmd = delete_object(&aid, false);
        assert_eq!(cmd.to_bytes().as_ref(), hex!("80E40000074F050102030405"));
    }

    #[test]
    fn test_delete_object_and_related() {
        let aid = Aid::new(hex!("A0000000030000")).unwrap();
        let cmd = delete_object(&aid, true);
        assert_eq!(cmd.p2, delete_p2::OBJECT_AND_RELATED);
        assert_eq!(cmd.data().unwrap(), hex!("4F07A0000000030000"));
    }
}
