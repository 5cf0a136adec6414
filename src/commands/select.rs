//! SELECT command

use crate::command::Command;
use crate::constants::{cla, ins, select_p1};

/// ISO 7816 SELECT by DF name
pub fn select_by_name(aid: &[u8]) -> Command {
    Command::new_with_data(
        cla::ISO7816,
        ins::SELECT,
        select_p1::BY_NAME,
        0x00,
        aid.to_vec(),
    )
}
