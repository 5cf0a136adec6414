//! INSTALL command variants

use bytes::{BufMut, BytesMut};

use crate::aid::Aid;
use crate::command::Command;
use crate::constants::{cla, ins, install_p1, tags};

/// The load parameters field advertising the total code length
pub fn load_file_parameters(code_length: usize) -> [u8; 6] {
    [
        tags::LOAD_PARAMETERS,
        0x04,
        tags::NON_VOLATILE_CODE_SIZE,
        0x02,
        ((code_length & 0xFF00) >> 8) as u8,
        (code_length & 0xFF) as u8,
    ]
}

/// INSTALL [for load]
///
/// `hash` is empty unless a load-file hash check is requested; the trailing
/// zero byte is the empty load token.
pub fn for_load(package_aid: &Aid, sd_aid: &Aid, hash: &[u8], load_params: &[u8]) -> Command {
    let mut data = BytesMut::new();
    data.put_slice(&package_aid.to_length_value());
    data.put_slice(&sd_aid.to_length_value());
    data.put_u8(hash.len() as u8);
    data.put_slice(hash);
    data.put_u8(load_params.len() as u8);
    data.put_slice(load_params);
    data.put_u8(0x00);

    Command::new_with_data(
        cla::GP,
        ins::INSTALL,
        install_p1::FOR_LOAD,
        0x00,
        data.freeze(),
    )
}

/// INSTALL [for install and make selectable]
pub fn for_install_and_make_selectable(
    package_aid: &Aid,
    applet_aid: &Aid,
    instance_aid: &Aid,
    privileges: u8,
    install_params: &[u8],
    install_token: &[u8],
) -> Command {
    let mut data = BytesMut::new();
    data.put_slice(&package_aid.to_length_value());
    data.put_slice(&applet_aid.to_length_value());
    data.put_slice(&instance_aid.to_length_value());
    data.put_u8(0x01);
    data.put_u8(privileges);
    data.put_u8(install_params.len() as u8);
    data.put_slice(install_params);
    data.put_u8(install_token.len() as u8);
    data.put_slice(install_token);

    Command::new_with_data(
        cla::GP,
        ins::INSTALL,
        install_p1::FOR_INSTALL_AND_MAKE_SELECTABLE,
        0x00,
        data.freeze(),
    )
}
