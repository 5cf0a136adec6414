//! LOAD command

use crate::command::Command;
use crate::constants::{cla, ins, load_p1};

/// One block of a load-file transfer
///
/// P2 carries the block sequence number, starting at 0.
pub fn load_block(is_last: bool, block_number: u8, block: &[u8]) -> Command {
    let p1 = if is_last {
        load_p1::LAST_BLOCK
    } else {
        load_p1::MORE_BLOCKS
    };
    Command::new_with_data(cla::GP, ins::LOAD, p1, block_number, block.to_vec())
}
