//! Cryptographic operations for the SCP01 and SCP02 protocols
//!
//! This module provides the DES/3DES primitives, the ISO 9797-1 method 2
//! padding, the two MAC constructions used on the wire, and the SCP02
//! session-key derivation. All MAC functions pad their input internally.

use cbc_mac::{CbcMac, Mac};
use cipher::{
    BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    generic_array::GenericArray,
};
use des::{Des, TdesEde3};
use subtle::ConstantTimeEq;

use crate::{Error, Result};

/// Null bytes used as initial IV
pub const NULL_BYTES_8: [u8; 8] = [0, 0, 0, 0, 0, 0, 0, 0];

/// SCP02 derivation purpose for the session encryption key
pub const DERIVATION_PURPOSE_ENC: [u8; 2] = [0x01, 0x82];
/// SCP02 derivation purpose for the session MAC key
pub const DERIVATION_PURPOSE_MAC: [u8; 2] = [0x01, 0x01];
/// SCP02 derivation purpose for the session response-MAC key
pub const DERIVATION_PURPOSE_RMAC: [u8; 2] = [0x01, 0x02];
/// SCP02 derivation purpose for the session data encryption key
pub const DERIVATION_PURPOSE_DEK: [u8; 2] = [0x01, 0x81];

/// Resize a 16-byte key to 24 bytes for 3DES
///
/// This copies the first 8 bytes to the end of the key (K1 ‖ K2 ‖ K1).
pub fn resize_key_24(key: &[u8; 16]) -> [u8; 24] {
    let mut result = [0u8; 24];
    result[..16].copy_from_slice(key);
    result[16..24].copy_from_slice(&key[0..8]);
    result
}

/// ISO 9797-1 padding method 2: append 0x80, then zero-fill to a block
///
/// Input that is already block-aligned grows by a full padding block.
pub fn pad80(data: &[u8]) -> Vec<u8> {
    let mut padded = Vec::with_capacity(data.len() + 8);
    padded.extend_from_slice(data);
    padded.push(0x80);
    while padded.len() % 8 != 0 {
        padded.push(0x00);
    }
    padded
}

/// Encrypt a single block with single DES in ECB mode
pub fn des_ecb_encrypt(key: &[u8], block: &[u8; 8]) -> Result<[u8; 8]> {
    let cipher =
        Des::new_from_slice(key).map_err(|_| Error::Crypto("failed to initialize DES cipher"))?;
    let mut b = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut b);
    Ok(b.into())
}

/// Encrypt block-aligned data with 3DES in ECB mode under a 16-byte key
pub fn tdes_ecb_encrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % 8 != 0 {
        return Err(Error::Crypto("input is not a multiple of the block size"));
    }
    let key24 = resize_key_24(key);
    let cipher = TdesEde3::new_from_slice(&key24)
        .map_err(|_| Error::Crypto("failed to initialize 3DES cipher"))?;
    let mut out = data.to_vec();
    for chunk in out.chunks_exact_mut(8) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
    Ok(out)
}

/// Encrypt block-aligned data with 3DES in CBC mode under a 16-byte key
pub fn tdes_cbc_encrypt(key: &[u8; 16], iv: &[u8; 8], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % 8 != 0 {
        return Err(Error::Crypto("input is not a multiple of the block size"));
    }
    let key24 = resize_key_24(key);
    let iv = GenericArray::clone_from_slice(iv);
    let mut encryptor = cbc::Encryptor::<TdesEde3>::new(&key24.into(), &iv);
    let mut out = data.to_vec();
    for chunk in out.chunks_exact_mut(8) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    Ok(out)
}

/// Decrypt block-aligned data with 3DES in CBC mode under a 16-byte key
pub fn tdes_cbc_decrypt(key: &[u8; 16], iv: &[u8; 8], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % 8 != 0 {
        return Err(Error::Crypto("input is not a multiple of the block size"));
    }
    let key24 = resize_key_24(key);
    let iv = GenericArray::clone_from_slice(iv);
    let mut decryptor = cbc::Decryptor::<TdesEde3>::new(&key24.into(), &iv);
    let mut out = data.to_vec();
    for chunk in out.chunks_exact_mut(8) {
        decryptor.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    Ok(out)
}

/// Full 3DES CBC-MAC over the pad80-padded input
///
/// Used for the SCP01/SCP02 cryptograms and for SCP01 command MACs.
pub fn mac_3des(key: &[u8; 16], iv: &[u8; 8], data: &[u8]) -> Result<[u8; 8]> {
    let padded = pad80(data);
    let key24 = resize_key_24(key);
    let mut mac = <CbcMac<TdesEde3> as Mac>::new_from_slice(&key24)
        .map_err(|_| Error::Crypto("failed to initialize 3DES MAC"))?;

    // The MAC implementation always chains from zero, so the IV is folded
    // into the first block by hand.
    let mut first_block = [0u8; 8];
    first_block.copy_from_slice(&padded[..8]);
    for (b, v) in first_block.iter_mut().zip(iv.iter()) {
        *b ^= v;
    }
    mac.update(&first_block);
    mac.update(&padded[8..]);

    Ok(mac.finalize().into_bytes().into())
}

/// Single-DES CBC over all but the last block, final block through 3DES
///
/// The ISO 9797-1 algorithm 3 shape used for SCP02 command MACs and for
/// response MACs; input is pad80-padded internally.
pub fn mac_full_3des(key: &[u8; 16], iv: &[u8; 8], data: &[u8]) -> Result<[u8; 8]> {
    let padded = pad80(data);

    let des_cipher = Des::new_from_slice(&key[..8])
        .map_err(|_| Error::Crypto("failed to initialize DES cipher"))?;
    let des3_key24 = resize_key_24(key);
    let des3_cipher = TdesEde3::new_from_slice(&des3_key24)
        .map_err(|_| Error::Crypto("failed to initialize 3DES cipher"))?;

    let mut chain = *iv;
    let (head, last) = padded.split_at(padded.len() - 8);

    for chunk in head.chunks_exact(8) {
        let mut block = GenericArray::clone_from_slice(chunk);
        for (b, v) in block.iter_mut().zip(chain.iter()) {
            *b ^= v;
        }
        des_cipher.encrypt_block(&mut block);
        chain.copy_from_slice(&block);
    }

    let mut block = GenericArray::clone_from_slice(last);
    for (b, v) in block.iter_mut().zip(chain.iter()) {
        *b ^= v;
    }
    des3_cipher.encrypt_block(&mut block);

    Ok(block.into())
}

/// Derive an SCP02 session key from a static key, sequence counter and purpose
pub fn derive_key(card_key: &[u8; 16], seq: &[u8; 2], purpose: &[u8; 2]) -> Result<[u8; 16]> {
    let mut derivation_data = [0u8; 16];
    derivation_data[0..2].copy_from_slice(purpose);
    derivation_data[2..4].copy_from_slice(seq);

    let encrypted = tdes_cbc_encrypt(card_key, &NULL_BYTES_8, &derivation_data)?;

    let mut result = [0u8; 16];
    result.copy_from_slice(&encrypted);
    Ok(result)
}

/// Timing-independent byte-string equality
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
