//! Secure Channel Protocol variants
//!
//! A variant is the pair of the SCP major version (1 or 2) and the card's
//! "i" parameter byte. Only the combinations below are defined by
//! GlobalPlatform 2.1.1 for DES-based channels. The "i" byte resolves into
//! four orthogonal flags, precomputed once per channel as [`ScpParams`] so
//! the wrap path never branches on the variant itself.

use std::fmt;

/// A defined (major, i) secure channel protocol combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ScpVariant {
    /// SCP01, i=05
    Scp01_05,
    /// SCP01, i=15 (ICV encryption)
    Scp01_15,
    /// SCP02, i=04 (1 base key)
    Scp02_04,
    /// SCP02, i=05
    Scp02_05,
    /// SCP02, i=0A (implicit initiation, 1 base key)
    Scp02_0A,
    /// SCP02, i=0B (implicit initiation)
    Scp02_0B,
    /// SCP02, i=14 (ICV encryption, 1 base key)
    Scp02_14,
    /// SCP02, i=15 (ICV encryption)
    Scp02_15,
    /// SCP02, i=1A (implicit initiation, ICV encryption, 1 base key)
    Scp02_1A,
    /// SCP02, i=1B (implicit initiation, ICV encryption)
    Scp02_1B,
}

/// The "i"-parameter flags of a variant, resolved once at channel setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScpParams {
    /// MAC is computed over the already-modified APDU (CLA bit set, Lc
    /// bumped); the implicit variants instead MAC the unmodified APDU
    pub pre_apdu_mac: bool,
    /// The previous ICV is encrypted before chaining into the next MAC
    pub icv_encrypted: bool,
    /// Three base keys (ENC/MAC/KEK) rather than one
    pub three_base_keys: bool,
    /// Channel initiation is implicit (no INITIALIZE UPDATE handshake)
    pub implicit: bool,
}

impl ScpVariant {
    /// The SCP major version, 1 or 2
    pub const fn major(self) -> u8 {
        match self {
            Self::Scp01_05 | Self::Scp01_15 => 1,
            _ => 2,
        }
    }

    /// The "i" parameter byte
    pub const fn i_parameter(self) -> u8 {
        match self {
            Self::Scp01_05 => 0x05,
            Self::Scp01_15 => 0x15,
            Self::Scp02_04 => 0x04,
            Self::Scp02_05 => 0x05,
            Self::Scp02_0A => 0x0A,
            Self::Scp02_0B => 0x0B,
            Self::Scp02_14 => 0x14,
            Self::Scp02_15 => 0x15,
            Self::Scp02_1A => 0x1A,
            Self::Scp02_1B => 0x1B,
        }
    }

    /// The resolved "i"-parameter flags
    pub const fn params(self) -> ScpParams {
        let i = self.i_parameter();
        ScpParams {
            pre_apdu_mac: !self.is_implicit(),
            icv_encrypted: i & 0x10 != 0,
            three_base_keys: i & 0x01 != 0,
            implicit: self.is_implicit(),
        }
    }

    /// Whether the channel is initiated implicitly (SCP02 i=0A/0B/1A/1B)
    pub const fn is_implicit(self) -> bool {
        matches!(
            self,
            Self::Scp02_0A | Self::Scp02_0B | Self::Scp02_1A | Self::Scp02_1B
        )
    }

    /// Whether response MACs are defined for this variant
    pub const fn supports_rmac(self) -> bool {
        self.major() == 2
    }
}

impl fmt::Display for ScpVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SCP0{}_i{:02X}", self.major(), self.i_parameter())
    }
}
