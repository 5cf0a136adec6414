//! Constants used in GlobalPlatform operations
//!
//! This module contains the constants defined by the GlobalPlatform
//! specification: CLA bytes, instruction codes, parameter values, status
//! words, and the well-known Security Domain AIDs.

/// GlobalPlatform command classes
pub mod cla {
    /// ISO7816 command class
    pub const ISO7816: u8 = 0x00;
    /// GlobalPlatform command class
    pub const GP: u8 = 0x80;
    /// Secure messaging command class (with MAC)
    pub const MAC: u8 = 0x84;
}

/// GlobalPlatform instruction codes
pub mod ins {
    /// SELECT command
    pub const SELECT: u8 = 0xA4;
    /// INITIALIZE UPDATE command
    pub const INITIALIZE_UPDATE: u8 = 0x50;
    /// EXTERNAL AUTHENTICATE command
    pub const EXTERNAL_AUTHENTICATE: u8 = 0x82;
    /// GET DATA command
    pub const GET_DATA: u8 = 0xCA;
    /// DELETE command
    pub const DELETE: u8 = 0xE4;
    /// LOAD command
    pub const LOAD: u8 = 0xE8;
    /// INSTALL command
    pub const INSTALL: u8 = 0xE6;
    /// GET STATUS command
    pub const GET_STATUS: u8 = 0xF2;
}

/// Parameter values for SELECT command (P1)
pub mod select_p1 {
    /// Select by DF name
    pub const BY_NAME: u8 = 0x04;
}

/// Parameter values for INSTALL command (P1)
pub mod install_p1 {
    /// Install for load
    pub const FOR_LOAD: u8 = 0x02;
    /// Install for install
    pub const FOR_INSTALL: u8 = 0x04;
    /// Install for make selectable
    pub const FOR_MAKE_SELECTABLE: u8 = 0x08;
    /// Install for install and make selectable
    pub const FOR_INSTALL_AND_MAKE_SELECTABLE: u8 = FOR_INSTALL | FOR_MAKE_SELECTABLE;
}

/// Parameter values for LOAD command (P1)
pub mod load_p1 {
    /// More blocks to follow
    pub const MORE_BLOCKS: u8 = 0x00;
    /// Last block
    pub const LAST_BLOCK: u8 = 0x80;
}

/// Parameter values for GET STATUS command (P1)
pub mod get_status_p1 {
    /// Get status of issuer security domain
    pub const ISSUER_SECURITY_DOMAIN: u8 = 0x80;
    /// Get status of applications and security domains
    pub const APPLICATIONS: u8 = 0x40;
    /// Get status of executable load files
    pub const EXEC_LOAD_FILES: u8 = 0x20;
    /// Get status of executable load files and modules
    pub const EXEC_LOAD_FILES_AND_MODULES: u8 = 0x10;
}

/// Parameter values for GET STATUS command (P2)
pub mod get_status_p2 {
    /// First (or only) part of the registry
    pub const FIRST: u8 = 0x00;
    /// Next part, after a 6310 status
    pub const NEXT: u8 = 0x01;
}

/// Parameter values for DELETE command (P2)
pub mod delete_p2 {
    /// Delete object
    pub const OBJECT: u8 = 0x00;
    /// Delete object and related objects
    pub const OBJECT_AND_RELATED: u8 = 0x80;
}

/// Tags used in GlobalPlatform commands and responses
pub mod tags {
    /// AID tag for DELETE and GET STATUS commands
    pub const AID: u8 = 0x4F;
    /// Load file data block tag
    pub const LOAD_FILE_DATA_BLOCK: u8 = 0xC4;
    /// System-specific load parameters tag
    pub const LOAD_PARAMETERS: u8 = 0xEF;
    /// Non-volatile code size tag inside the load parameters
    pub const NON_VOLATILE_CODE_SIZE: u8 = 0xC6;
    /// Application-specific install parameters tag
    pub const INSTALL_PARAMETERS: u8 = 0xC9;
}

/// Commonly used status words in GlobalPlatform
pub mod status {
    use crate::response::StatusWord;

    /// Success
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);
    /// More registry records available (GET STATUS continuation)
    pub const MORE_RECORDS: StatusWord = StatusWord::new(0x63, 0x10);
    /// Wrong length
    pub const WRONG_LENGTH: StatusWord = StatusWord::new(0x67, 0x00);
    /// File not found
    pub const FILE_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x82);
    /// Referenced data not found
    pub const REFERENCED_DATA_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x88);
    /// Security condition not satisfied
    pub const SECURITY_CONDITION_NOT_SATISFIED: StatusWord = StatusWord::new(0x69, 0x82);
    /// Authentication method blocked
    pub const AUTHENTICATION_METHOD_BLOCKED: StatusWord = StatusWord::new(0x69, 0x83);
}

/// Well-known Security Domain AIDs, in the order they are tried when no
/// explicit AID is configured.
pub mod sd_aids {
    /// GlobalPlatform 2.1.1 card manager
    pub const GP211: &[u8] = &[0xA0, 0x00, 0x00, 0x01, 0x51, 0x00, 0x00, 0x00];
    /// Open Platform 2.0.1 card manager (7-byte form)
    pub const OP201_A: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00];
    /// Open Platform 2.0.1 card manager (8-byte form)
    pub const OP201_B: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00];
    /// Gemalto card manager
    pub const GEMALTO: &[u8] = &[0xA0, 0x00, 0x00, 0x00, 0x18, 0x43, 0x4D, 0x00];

    /// Selection candidates: (name, AID), tried in this order
    pub const KNOWN: &[(&str, &[u8])] = &[
        ("GP2.1.1", GP211),
        ("OP2.01a", OP201_A),
        ("OP2.01b", OP201_B),
        ("Gemalto", GEMALTO),
    ];
}

/// Default static key used by test cards (ENC, MAC and KEK all equal)
pub const DEFAULT_KEY: [u8; 16] = [
    0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E,
    0x4F,
];

/// Gemalto sample mother key, used with the pre-handshake diversification step
pub const GEMALTO_MOTHER_KEY: [u8; 16] = [
    0x47, 0x45, 0x4D, 0x58, 0x50, 0x52, 0x45, 0x53, 0x53, 0x4F, 0x53, 0x41, 0x4D, 0x50, 0x4C,
    0x45,
];

/// Default block size for LOAD commands, before secure-channel overhead
pub const DEFAULT_LOAD_SIZE: usize = 255;

/// Host challenge length in bytes
pub const HOST_CHALLENGE_LENGTH: usize = 8;
