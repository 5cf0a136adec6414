//! Static key sets and key diversification
//!
//! A card's Security Domain holds up to 128 static key sets of three
//! double-length DES keys (ENC, MAC, KEK). Some card profiles ship with a
//! mother key that must be diversified with card-identity bytes before use;
//! the VISA2 and EMV derivations are supported.

use zeroize::Zeroize;

use crate::crypto::tdes_ecb_encrypt;
use crate::{Error, Result};

/// Static-key diversification modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Diversification {
    /// Keys are used as configured
    #[default]
    None,
    /// VISA2 derivation
    Visa2,
    /// EMV (CPG 2.04) derivation
    Emv,
}

/// Key type tag carried by a key set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    /// Plain DES/3DES keys
    #[default]
    DesEcb,
}

/// A static GlobalPlatform key set: ENC, MAC and KEK
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct KeySet {
    enc: [u8; 16],
    mac: [u8; 16],
    kek: [u8; 16],
    #[zeroize(skip)]
    key_type: KeyType,
    #[zeroize(skip)]
    diversification: Diversification,
    #[zeroize(skip)]
    diversified: bool,
}

impl KeySet {
    /// Create a key set with no diversification
    pub fn new(enc: [u8; 16], mac: [u8; 16], kek: [u8; 16]) -> Self {
        Self::with_diversification(enc, mac, kek, Diversification::None)
    }

    /// Create a key set that diversifies once with the given mode
    pub fn with_diversification(
        enc: [u8; 16],
        mac: [u8; 16],
        kek: [u8; 16],
        diversification: Diversification,
    ) -> Self {
        Self {
            enc,
            mac,
            kek,
            key_type: KeyType::DesEcb,
            diversification,
            diversified: false,
        }
    }

    /// Create a key set where all three keys are the same
    pub fn from_single_key(key: [u8; 16]) -> Self {
        Self::new(key, key, key)
    }

    /// The static encryption key
    pub fn enc(&self) -> &[u8; 16] {
        &self.enc
    }

    /// The static MAC key
    pub fn mac(&self) -> &[u8; 16] {
        &self.mac
    }

    /// The static key encryption key
    pub fn kek(&self) -> &[u8; 16] {
        &self.kek
    }

    /// The key type tag
    pub const fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// The configured diversification mode
    pub const fn diversification(&self) -> Diversification {
        self.diversification
    }

    /// Whether [`KeySet::diversify`] has already been applied
    pub const fn is_diversified(&self) -> bool {
        self.diversified
    }

    /// Replace one key in place; `id` is 1 (ENC), 2 (MAC) or 3 (KEK)
    pub fn set_key(&mut self, id: u8, key_type: KeyType, key: &[u8]) -> Result<()> {
        if key.len() != 16 {
            return Err(Error::InvalidLength {
                expected: 16,
                actual: key.len(),
            });
        }
        let slot = match id {
            1 => &mut self.enc,
            2 => &mut self.mac,
            3 => &mut self.kek,
            _ => return Err(Error::Config("key id must be 1, 2 or 3")),
        };
        slot.copy_from_slice(key);
        self.key_type = key_type;
        Ok(())
    }

    /// Diversify the key set with card-identity bytes
    ///
    /// Applies at most once: further calls (and any call with mode `None`)
    /// are no-ops. The seed must provide at least the 10 bytes the
    /// derivations index into.
    pub fn diversify(&mut self, seed: &[u8]) -> Result<()> {
        if self.diversified || self.diversification == Diversification::None {
            return Ok(());
        }
        if seed.len() < 10 {
            return Err(Error::InvalidLength {
                expected: 10,
                actual: seed.len(),
            });
        }

        let mode = self.diversification;
        for (i, key) in [&mut self.enc, &mut self.mac, &mut self.kek]
            .into_iter()
            .enumerate()
        {
            let input = derivation_input(mode, seed, (i + 1) as u8);
            let derived = tdes_ecb_encrypt(key, &input)?;
            key.copy_from_slice(&derived);
        }
        self.diversified = true;
        Ok(())
    }
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs
        f.debug_struct("KeySet")
            .field("key_type", &self.key_type)
            .field("diversification", &self.diversification)
            .field("diversified", &self.diversified)
            .finish()
    }
}

/// Build the 16-byte 3DES-ECB input for subkey `i` of a diversification
pub(crate) fn derivation_input(mode: Diversification, seed: &[u8], i: u8) -> [u8; 16] {
    let half = match mode {
        Diversification::Emv => [seed[4], seed[5], seed[6], seed[7], seed[8], seed[9]],
        _ => [seed[0], seed[1], seed[4], seed[5], seed[6], seed[7]],
    };
    let mut data = [0u8; 16];
    data[0..6].copy_from_slice(&half);
    data[6] = 0xF0;
    data[7] = i;
    data[8..14].copy_from_slice(&half);
    data[14] = 0x0F;
    data[15] = i;
    data
}

/// Session keys derived for one secure channel
///
/// Indexed per the protocol as ENC, MAC, DEK and (SCP02 only) RMAC.
/// Destroyed on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SessionKeys {
    enc: [u8; 16],
    mac: [u8; 16],
    dek: [u8; 16],
    rmac: Option<[u8; 16]>,
}

impl SessionKeys {
    /// Assemble a session key set
    pub fn new(enc: [u8; 16], mac: [u8; 16], dek: [u8; 16], rmac: Option<[u8; 16]>) -> Self {
        Self {
            enc,
            mac,
            dek,
            rmac,
        }
    }

    /// The session encryption key
    pub fn enc(&self) -> &[u8; 16] {
        &self.enc
    }

    /// The session MAC key
    pub fn mac(&self) -> &[u8; 16] {
        &self.mac
    }

    /// The session data encryption key
    pub fn dek(&self) -> &[u8; 16] {
        &self.dek
    }

    /// The session response-MAC key, when the protocol derives one
    pub fn rmac(&self) -> Option<&[u8; 16]> {
        self.rmac.as_ref()
    }
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("rmac", &self.rmac.is_some())
            .finish()
    }
}
