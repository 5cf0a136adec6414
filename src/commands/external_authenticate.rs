//! EXTERNAL AUTHENTICATE command

use crate::command::Command;
use crate::constants::{cla, ins};
use crate::secure_channel::SecurityLevel;

/// Authenticate the host and request a security level for the session
///
/// Always transmitted through a MAC-only wrapper, so the class byte is the
/// secure-messaging one from the start.
pub fn external_authenticate(level: SecurityLevel, host_cryptogram: &[u8; 8]) -> Command {
    Command::new_with_data(
        cla::MAC,
        ins::EXTERNAL_AUTHENTICATE,
        level.bits(),
        0x00,
        host_cryptogram.to_vec(),
    )
}
