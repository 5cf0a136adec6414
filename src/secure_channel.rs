//! Secure-channel command wrapping and response verification
//!
//! The [`SecureChannelWrapper`] owns the session keys, the running MAC
//! chain (ICV) and, when response MACs are active, the response-side ICV
//! and accumulator. Wrapping is strictly ordered: every command MAC becomes
//! the ICV of the next, so a wrapper must never be shared or re-entered.

use std::ops::BitOr;

use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::command::Command;
use crate::crypto::{
    NULL_BYTES_8, constant_time_eq, des_ecb_encrypt, mac_3des, mac_full_3des, pad80,
    tdes_cbc_encrypt, tdes_ecb_encrypt,
};
use crate::keys::SessionKeys;
use crate::response::Response;
use crate::scp::{ScpParams, ScpVariant};
use crate::{Error, Result};

/// APDU security level bitmask
///
/// `ENC` implies `MAC` (enforced when the channel is opened); `RMAC` is
/// only defined for SCP02.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityLevel(u8);

impl SecurityLevel {
    /// No protection
    pub const CLEAR: Self = Self(0x00);
    /// Command MAC
    pub const MAC: Self = Self(0x01);
    /// Command encryption
    pub const ENC: Self = Self(0x02);
    /// Response MAC
    pub const RMAC: Self = Self(0x10);

    const VALID_MASK: u8 = 0x01 | 0x02 | 0x10;

    /// Validate a raw bitmask
    pub fn from_bits(bits: u8) -> Result<Self> {
        if bits & !Self::VALID_MASK != 0 {
            return Err(Error::Config("invalid security level bits"));
        }
        Ok(Self(bits))
    }

    /// The raw bitmask, as sent in EXTERNAL AUTHENTICATE P1
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether command MACs are active
    pub const fn mac(self) -> bool {
        self.0 & Self::MAC.0 != 0
    }

    /// Whether command encryption is active
    pub const fn enc(self) -> bool {
        self.0 & Self::ENC.0 != 0
    }

    /// Whether response MACs are active
    pub const fn rmac(self) -> bool {
        self.0 & Self::RMAC.0 != 0
    }

    /// This level with the MAC bit set
    pub const fn with_mac(self) -> Self {
        Self(self.0 | Self::MAC.0)
    }

    /// This level with the RMAC bit cleared
    pub const fn without_rmac(self) -> Self {
        Self(self.0 & !Self::RMAC.0)
    }
}

impl BitOr for SecurityLevel {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Per-command secure channel state machine
pub struct SecureChannelWrapper {
    keys: SessionKeys,
    variant: ScpVariant,
    params: ScpParams,
    level: SecurityLevel,
    /// Command ICV; `None` until the first MAC of the session
    icv: Option<[u8; 8]>,
    /// Response ICV; set at EXTERNAL AUTHENTICATE (or implicit seeding)
    ricv: Option<[u8; 8]>,
    /// Cleartext accumulator for response-MAC verification
    rmac_data: BytesMut,
}

impl SecureChannelWrapper {
    /// Create a wrapper for an explicitly initiated channel
    ///
    /// The ICV starts as the zero block, the state before any MAC exists.
    pub fn new(keys: SessionKeys, variant: ScpVariant, level: SecurityLevel) -> Self {
        Self {
            keys,
            variant,
            params: variant.params(),
            level,
            icv: None,
            ricv: None,
            rmac_data: BytesMut::new(),
        }
    }

    /// Create a wrapper for an implicitly initiated channel with seeded ICVs
    pub fn with_icv(
        keys: SessionKeys,
        variant: ScpVariant,
        level: SecurityLevel,
        icv: [u8; 8],
        ricv: [u8; 8],
    ) -> Self {
        Self {
            keys,
            variant,
            params: variant.params(),
            level,
            icv: Some(icv),
            ricv: Some(ricv),
            rmac_data: BytesMut::new(),
        }
    }

    /// The active security level
    pub const fn security_level(&self) -> SecurityLevel {
        self.level
    }

    /// Commit a new security level (after EXTERNAL AUTHENTICATE succeeds)
    pub fn set_security_level(&mut self, level: SecurityLevel) {
        self.level = level;
    }

    /// The protocol variant of this channel
    pub const fn variant(&self) -> ScpVariant {
        self.variant
    }

    /// The session keys
    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// The current command ICV (zero until the first MAC)
    pub fn icv(&self) -> [u8; 8] {
        self.icv.unwrap_or(NULL_BYTES_8)
    }

    /// Copy the command ICV into the response ICV
    ///
    /// Called at the moment EXTERNAL AUTHENTICATE succeeds with RMAC
    /// requested; from then on the response ICV evolves over response
    /// traffic only.
    pub fn seed_response_icv(&mut self) {
        self.ricv = Some(self.icv());
    }

    /// Bytes of overhead the current level adds to a command payload
    pub fn wrap_overhead(&self) -> usize {
        let mut overhead = 0;
        if self.level.mac() {
            overhead += 8;
        }
        if self.level.enc() {
            overhead += 8;
        }
        overhead
    }

    /// Wrap a plaintext command for transmission
    pub fn wrap(&mut self, command: &Command) -> Result<Command> {
        let orig_data = command.data().unwrap_or(&[]);
        let orig_lc = orig_data.len();

        // Reject oversized payloads before any state is touched
        if (self.level.mac() || self.level.enc()) && orig_lc > 255 - self.wrap_overhead() {
            return Err(Error::ApduTooLong(orig_lc));
        }

        if self.level.rmac() {
            // Snapshot the cleartext command; logical-channel bits do not
            // take part in the response MAC
            self.rmac_data.clear();
            self.rmac_data.put_u8(command.cla & !0x07);
            self.rmac_data.put_u8(command.ins);
            self.rmac_data.put_u8(command.p1);
            self.rmac_data.put_u8(command.p2);
            self.rmac_data.put_u8(orig_lc as u8);
            self.rmac_data.put_slice(orig_data);
        }

        if !self.level.mac() && !self.level.enc() {
            return Ok(command.clone());
        }

        let mut new_cla = command.cla;
        let mut new_lc = orig_lc;
        let mut mac = None;

        if self.level.mac() {
            let icv = match self.icv {
                None => NULL_BYTES_8,
                Some(previous) if self.params.icv_encrypted => self.encrypt_icv(&previous)?,
                Some(previous) => previous,
            };

            if self.params.pre_apdu_mac {
                new_cla |= 0x04;
                new_lc += 8;
            }

            let mut input = BytesMut::with_capacity(5 + orig_lc);
            input.put_u8(new_cla);
            input.put_u8(command.ins);
            input.put_u8(command.p1);
            input.put_u8(command.p2);
            input.put_u8(new_lc as u8);
            input.put_slice(orig_data);

            let computed = match self.variant.major() {
                1 => mac_3des(self.keys.mac(), &icv, &input)?,
                _ => mac_full_3des(self.keys.mac(), &icv, &input)?,
            };
            self.icv = Some(computed);

            if !self.params.pre_apdu_mac {
                new_cla |= 0x04;
                new_lc += 8;
            }
            mac = Some(computed);
        }

        let mut new_data = orig_data.to_vec();
        if self.level.enc() && orig_lc > 0 {
            let plain = match self.variant.major() {
                1 => {
                    // SCP01 enciphers Lc together with the data, padding
                    // only when the result is not already block-aligned
                    let mut buf = Vec::with_capacity(1 + orig_lc + 8);
                    buf.push(orig_lc as u8);
                    buf.extend_from_slice(orig_data);
                    if buf.len() % 8 != 0 { pad80(&buf) } else { buf }
                }
                _ => pad80(orig_data),
            };
            new_lc += plain.len() - orig_lc;
            new_data = tdes_cbc_encrypt(self.keys.enc(), &NULL_BYTES_8, &plain)?;
        }

        if let Some(mac) = mac {
            new_data.extend_from_slice(&mac);
        }
        debug_assert_eq!(new_data.len(), new_lc);

        let mut wrapped = Command::new(new_cla, command.ins, command.p1, command.p2);
        if !new_data.is_empty() {
            wrapped = wrapped.with_data(new_data);
        }
        if let Some(le) = command.le {
            wrapped = wrapped.with_le(le);
        }

        trace!(
            variant = %self.variant,
            level = self.level.bits(),
            wrapped = %hex::encode(wrapped.to_bytes()),
            "wrapped command"
        );
        Ok(wrapped)
    }

    /// Verify and strip the response MAC; pass-through when RMAC is off
    pub fn unwrap(&mut self, response: Response) -> Result<Response> {
        if !self.level.rmac() {
            return Ok(response);
        }

        let body = response.data();
        if body.len() < 8 {
            return Err(Error::Security("response too short for a response MAC"));
        }
        let data_len = body.len() - 8;

        let ricv = self
            .ricv
            .ok_or(Error::Security("response ICV not initialised"))?;
        let rmac_key = self
            .keys
            .rmac()
            .ok_or(Error::Security("no response-MAC session key"))?;

        self.rmac_data.put_u8(data_len as u8);
        self.rmac_data.put_slice(&body[..data_len]);
        self.rmac_data.put_u8(response.status().sw1);
        self.rmac_data.put_u8(response.status().sw2);

        let computed = mac_full_3des(rmac_key, &ricv, &self.rmac_data)?;
        if !constant_time_eq(&computed, &body[data_len..]) {
            return Err(Error::Security("response MAC invalid"));
        }
        self.ricv = Some(computed);

        trace!(stripped = data_len, "response MAC verified");
        Ok(Response::new(body[..data_len].to_vec(), response.status()))
    }

    fn encrypt_icv(&self, icv: &[u8; 8]) -> Result<[u8; 8]> {
        match self.variant.major() {
            1 => {
                let encrypted = tdes_ecb_encrypt(self.keys.mac(), icv)?;
                let mut out = [0u8; 8];
                out.copy_from_slice(&encrypted);
                Ok(out)
            }
            _ => des_ecb_encrypt(&self.keys.mac()[..8], icv),
        }
    }
}

impl std::fmt::Debug for SecureChannelWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannelWrapper")
            .field("variant", &self.variant)
            .field("level", &self.level)
            .finish()
    }
}
