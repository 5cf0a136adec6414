//! Session-key derivation and mutual-authentication state
//!
//! A [`Session`] is created from the INITIALIZE UPDATE response during the
//! explicit handshake; it derives the per-session keys and verifies the
//! card's cryptogram before anything else happens on the channel. Implicit
//! SCP02 channels derive their keys directly through
//! [`derive_session_keys_scp02`] with the incremented-counter rule.

use tracing::debug;

use crate::crypto::{
    DERIVATION_PURPOSE_DEK, DERIVATION_PURPOSE_ENC, DERIVATION_PURPOSE_MAC,
    DERIVATION_PURPOSE_RMAC, NULL_BYTES_8, constant_time_eq, derive_key, mac_3des,
    tdes_ecb_encrypt,
};
use crate::keys::{KeySet, SessionKeys};
use crate::scp::ScpVariant;
use crate::{Error, Result};

/// Length of the INITIALIZE UPDATE response payload
pub const INIT_UPDATE_RESPONSE_LENGTH: usize = 28;

/// Derive SCP01 session keys
///
/// The derivation block interleaves card and host randomness:
/// card[16..20] ‖ host[0..4] ‖ card[12..16] ‖ host[4..8]. ENC and MAC are
/// 3DES-ECB encryptions of that block under the matching static key; the
/// session DEK is the static KEK unchanged.
pub fn derive_session_keys_scp01(
    static_keys: &KeySet,
    host_challenge: &[u8; 8],
    card_response: &[u8],
) -> Result<SessionKeys> {
    let mut derivation = [0u8; 16];
    derivation[0..4].copy_from_slice(&card_response[16..20]);
    derivation[4..8].copy_from_slice(&host_challenge[0..4]);
    derivation[8..12].copy_from_slice(&card_response[12..16]);
    derivation[12..16].copy_from_slice(&host_challenge[4..8]);

    let mut enc = [0u8; 16];
    enc.copy_from_slice(&tdes_ecb_encrypt(static_keys.enc(), &derivation)?);
    let mut mac = [0u8; 16];
    mac.copy_from_slice(&tdes_ecb_encrypt(static_keys.mac(), &derivation)?);

    Ok(SessionKeys::new(enc, mac, *static_keys.kek(), None))
}

/// Derive SCP02 session keys from the sequence counter
///
/// For an implicit channel the RMAC key uses the successor of the counter,
/// incremented with carry from the low byte; a counter of FFFF wraps to
/// 0000.
pub fn derive_session_keys_scp02(
    static_keys: &KeySet,
    seq: &[u8; 2],
    implicit: bool,
) -> Result<SessionKeys> {
    let mac = derive_key(static_keys.mac(), seq, &DERIVATION_PURPOSE_MAC)?;

    let rmac_seq = if implicit {
        if seq[1] == 0xFF {
            [seq[0].wrapping_add(1), 0x00]
        } else {
            [seq[0], seq[1] + 1]
        }
    } else {
        *seq
    };
    let rmac = derive_key(static_keys.mac(), &rmac_seq, &DERIVATION_PURPOSE_RMAC)?;

    let enc = derive_key(static_keys.enc(), seq, &DERIVATION_PURPOSE_ENC)?;
    let dek = derive_key(static_keys.kek(), seq, &DERIVATION_PURPOSE_DEK)?;

    Ok(SessionKeys::new(enc, mac, dek, Some(rmac)))
}

/// An authenticated secure-channel session
///
/// Construction derives the session keys and verifies the card cryptogram;
/// a `Session` therefore only exists for cards that proved knowledge of the
/// static keys.
#[derive(Debug)]
pub struct Session {
    keys: SessionKeys,
    variant: ScpVariant,
    host_challenge: [u8; 8],
    /// Sequence counter ‖ card challenge (SCP02), or card randomness (SCP01)
    card_challenge: [u8; 8],
}

impl Session {
    /// Create a session from the INITIALIZE UPDATE response
    pub fn new(
        static_keys: &KeySet,
        variant: ScpVariant,
        init_response: &[u8],
        host_challenge: &[u8; 8],
    ) -> Result<Self> {
        if init_response.len() != INIT_UPDATE_RESPONSE_LENGTH {
            return Err(Error::ProtocolMismatch(
                "wrong INITIALIZE UPDATE response length",
            ));
        }
        if init_response[11] != variant.major() {
            return Err(Error::ProtocolMismatch(
                "card reported a different SCP major version",
            ));
        }

        let keys = match variant.major() {
            1 => derive_session_keys_scp01(static_keys, host_challenge, init_response)?,
            _ => {
                let mut seq = [0u8; 2];
                seq.copy_from_slice(&init_response[12..14]);
                derive_session_keys_scp02(static_keys, &seq, false)?
            }
        };

        let mut card_challenge = [0u8; 8];
        card_challenge.copy_from_slice(&init_response[12..20]);

        let session = Self {
            keys,
            variant,
            host_challenge: *host_challenge,
            card_challenge,
        };

        let expected = session.card_cryptogram()?;
        if !constant_time_eq(&expected, &init_response[20..28]) {
            return Err(Error::AuthenticationFailed("card cryptogram mismatch"));
        }
        debug!(variant = %variant, "card cryptogram verified");

        Ok(session)
    }

    /// The cryptogram the card must present: MAC over host ‖ card challenge
    fn card_cryptogram(&self) -> Result<[u8; 8]> {
        let mut input = [0u8; 16];
        input[..8].copy_from_slice(&self.host_challenge);
        input[8..].copy_from_slice(&self.card_challenge);
        mac_3des(self.keys.enc(), &NULL_BYTES_8, &input)
    }

    /// The cryptogram the host presents: MAC over card ‖ host challenge
    pub fn host_cryptogram(&self) -> Result<[u8; 8]> {
        let mut input = [0u8; 16];
        input[..8].copy_from_slice(&self.card_challenge);
        input[8..].copy_from_slice(&self.host_challenge);
        mac_3des(self.keys.enc(), &NULL_BYTES_8, &input)
    }

    /// The session keys
    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    /// The negotiated variant
    pub const fn variant(&self) -> ScpVariant {
        self.variant
    }

    /// The host challenge sent in INITIALIZE UPDATE
    pub fn host_challenge(&self) -> &[u8; 8] {
        &self.host_challenge
    }

    /// The card's sequence counter and challenge bytes
    pub fn card_challenge(&self) -> &[u8; 8] {
        &self.card_challenge
    }

    /// Consume the session, handing its keys to a wrapper
    pub fn into_keys(self) -> SessionKeys {
        self.keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    // Real exchange captured from a test card with the default key set
    fn test_card_keys() -> KeySet {
        KeySet::from_single_key(hex!("404142434445464748494a4b4c4d4e4f"))
    }

    const INIT_RESPONSE: [u8; 28] =
        hex!("000002650183039536622002000de9c62ba1c4c8e55fcb91b6654ce4");
    const HOST_CHALLENGE: [u8; 8] = hex!("f0467f908e5ca23f");

    #[test]
    fn test_scp02_session() {
        let session = Session::new(
            &test_card_keys(),
            ScpVariant::Scp02_15,
            &INIT_RESPONSE,
            &HOST_CHALLENGE,
        )
        .unwrap();

        assert_eq!(session.variant(), ScpVariant::Scp02_15);
        assert_eq!(&session.card_challenge()[..2], &hex!("000d"));
        assert!(session.keys().rmac().is_some());
    }

    #[test]
    fn test_wrong_response_length() {
        let err = Session::new(
            &test_card_keys(),
            ScpVariant::Scp02_15,
            &hex!("0102"),
            &HOST_CHALLENGE,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ProtocolMismatch(_)));
    }

    #[test]
    fn test_scp_major_mismatch() {
        let err = Session::new(
            &test_card_keys(),
            ScpVariant::Scp01_05,
            &INIT_RESPONSE,
            &HOST_CHALLENGE,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ProtocolMismatch(_)));
    }

    #[test]
    fn test_bad_cryptogram() {
        let mut tampered = INIT_RESPONSE;
        tampered[27] ^= 0x01;
        let err = Session::new(
            &test_card_keys(),
            ScpVariant::Scp02_15,
            &tampered,
            &HOST_CHALLENGE,
        )
        .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(_)));
    }

    #[test]
    fn test_scp01_derivation_block_layout() {
        // SCP01 sessions are derived from interleaved randomness; with a
        // zero static key set and distinct markers the derived ENC and MAC
        // only differ through the static keys, which here are equal.
        let statics = test_card_keys();
        let response = {
            let mut r = [0u8; 28];
            r[11] = 1;
            r[12..20].copy_from_slice(&hex!("1122334455667788"));
            r
        };
        let keys =
            derive_session_keys_scp01(&statics, &hex!("aabbccddeeff0011"), &response).unwrap();
        assert_eq!(keys.enc(), keys.mac());
        assert_eq!(keys.dek(), statics.kek());
        assert!(keys.rmac().is_none());
    }

    #[test]
    fn test_scp02_rmac_counter_increment() {
        let statics = test_card_keys();

        // Explicit: RMAC derived from the same counter
        let explicit = derive_session_keys_scp02(&statics, &hex!("00ff"), false).unwrap();
        // Implicit: RMAC derived from the incremented counter, carrying
        // into the high byte
        let implicit = derive_session_keys_scp02(&statics, &hex!("00ff"), true).unwrap();
        let next = derive_session_keys_scp02(&statics, &hex!("0100"), false).unwrap();

        assert_eq!(explicit.mac(), implicit.mac());
        assert_ne!(explicit.rmac().unwrap(), implicit.rmac().unwrap());
        assert_eq!(
            implicit.rmac().unwrap(),
            &derive_key(statics.mac(), &hex!("0100"), &DERIVATION_PURPOSE_RMAC).unwrap()
        );
        assert_eq!(implicit.rmac().unwrap(), next.rmac().unwrap());

        // Double carry wraps around
        let wrapped = derive_session_keys_scp02(&statics, &hex!("ffff"), true).unwrap();
        assert_eq!(
            wrapped.rmac().unwrap(),
            &derive_key(statics.mac(), &hex!("0000"), &DERIVATION_PURPOSE_RMAC).unwrap()
        );
    }
}
