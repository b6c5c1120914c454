//! At-rest protection for individual pads and for the pad info blob.

use crate::cascade::cipher::{cascade_encrypt, CascadeNonces};
use crate::cascade::keys::DatabaseKeys;
use crate::cascade::mac::{cascade_mac, verify_cascade_mac};
use crate::error::{JerichoError, Result};
use crate::pad::{OneTimePad, PadIdentifier, PAD_IDENTIFIER_SIZE, PAD_SIZE};
use crate::user::Callsign;
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroizing;

/// A pad encrypted under the working keys. The identifier stays in the
/// clear so pads can be addressed without decrypting; the remaining 185
/// bytes are cascade-encrypted under nonces derived from the pad number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPad {
    pub pad_number: u64,
    pub identifier: PadIdentifier,
    pub ciphertext: Vec<u8>,
    pub mac: Vec<u8>,
}

/// aesNonce || salsaNonce || callsign || identifier || ciphertext. A pad moved
/// into another user's bucket fails verification.
fn pad_mac_input(
    nonces: &CascadeNonces,
    owner: Callsign,
    identifier: &PadIdentifier,
    ciphertext: &[u8],
) -> Vec<u8> {
    let nonce_bytes = nonces.to_bytes();
    let owner = owner.as_str().as_bytes();
    let mut data = Vec::with_capacity(
        nonce_bytes.len() + owner.len() + PAD_IDENTIFIER_SIZE + ciphertext.len(),
    );
    data.extend_from_slice(&nonce_bytes);
    data.extend_from_slice(owner);
    data.extend_from_slice(identifier.as_bytes());
    data.extend_from_slice(ciphertext);
    data
}

/// Encrypt-then-MAC one pad belonging to `owner`
pub fn seal_pad(keys: &DatabaseKeys, owner: Callsign, pad: &OneTimePad) -> Result<SealedPad> {
    let nonces = CascadeNonces::for_pad(pad.number());
    let identifier = pad.identifier();
    let ciphertext = cascade_encrypt(
        &keys.cipher,
        &nonces,
        &pad.as_bytes()[PAD_IDENTIFIER_SIZE..],
    )?;
    let mac = cascade_mac(&keys.mac, &pad_mac_input(&nonces, owner, &identifier, &ciphertext));

    Ok(SealedPad {
        pad_number: pad.number(),
        identifier,
        ciphertext,
        mac: mac.to_vec(),
    })
}

/// Verify the MAC, then decrypt. Nothing is decrypted for a pad that fails.
pub fn open_pad(keys: &DatabaseKeys, owner: Callsign, sealed: &SealedPad) -> Result<OneTimePad> {
    let nonces = CascadeNonces::for_pad(sealed.pad_number);
    let data = pad_mac_input(&nonces, owner, &sealed.identifier, &sealed.ciphertext);
    if !verify_cascade_mac(&keys.mac, &data, &sealed.mac) {
        tracing::warn!(user = %owner, pad = sealed.pad_number, "pad failed MAC verification");
        return Err(JerichoError::MacVerificationFailed(format!(
            "pad {} of {}",
            sealed.pad_number, owner
        )));
    }

    let body = Zeroizing::new(cascade_encrypt(&keys.cipher, &nonces, &sealed.ciphertext)?);
    if body.len() + PAD_IDENTIFIER_SIZE != PAD_SIZE {
        return Err(JerichoError::InvalidPad(format!(
            "pad {} decrypted to {} bytes",
            sealed.pad_number,
            body.len() + PAD_IDENTIFIER_SIZE
        )));
    }

    let mut bytes = Zeroizing::new([0u8; PAD_SIZE]);
    bytes[..PAD_IDENTIFIER_SIZE].copy_from_slice(sealed.identifier.as_bytes());
    bytes[PAD_IDENTIFIER_SIZE..].copy_from_slice(&body);
    OneTimePad::new(sealed.pad_number, *bytes)
}

/// Encrypted, authenticated JSON document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    pub ciphertext: Vec<u8>,
    pub mac: Vec<u8>,
}

fn blob_mac_input(ciphertext: &[u8]) -> Vec<u8> {
    let mut data = CascadeNonces::INFO.to_bytes().to_vec();
    data.extend_from_slice(ciphertext);
    data
}

/// Serialize `value` as JSON and encrypt-then-MAC it under the fixed info
/// nonces, which no pad number can produce
pub fn seal_info<T: Serialize>(keys: &DatabaseKeys, value: &T) -> Result<SealedBlob> {
    let json = Zeroizing::new(serde_json::to_vec(value)?);
    let ciphertext = cascade_encrypt(&keys.cipher, &CascadeNonces::INFO, &json)?;
    let mac = cascade_mac(&keys.mac, &blob_mac_input(&ciphertext));
    Ok(SealedBlob {
        ciphertext,
        mac: mac.to_vec(),
    })
}

pub fn open_info<T: DeserializeOwned>(keys: &DatabaseKeys, sealed: &SealedBlob) -> Result<T> {
    if !verify_cascade_mac(&keys.mac, &blob_mac_input(&sealed.ciphertext), &sealed.mac) {
        tracing::warn!("pad info failed MAC verification");
        return Err(JerichoError::MacVerificationFailed("pad info".into()));
    }
    let json = Zeroizing::new(cascade_encrypt(
        &keys.cipher,
        &CascadeNonces::INFO,
        &sealed.ciphertext,
    )?);
    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn keys() -> DatabaseKeys {
        DatabaseKeys::derive_from_master(&[0x42; 64])
    }

    fn pad(number: u64) -> OneTimePad {
        let mut bytes = [0u8; PAD_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(31).wrapping_add(number as u8);
        }
        OneTimePad::new(number, bytes).unwrap()
    }

    #[test]
    fn test_pad_roundtrip() {
        let original = pad(17);
        let sealed = seal_pad(&keys(), Callsign::Alpha, &original).unwrap();
        assert_eq!(sealed.identifier, original.identifier());
        assert_eq!(sealed.ciphertext.len(), PAD_SIZE - PAD_IDENTIFIER_SIZE);
        assert_ne!(&sealed.ciphertext[..], &original.as_bytes()[PAD_IDENTIFIER_SIZE..]);

        let opened = open_pad(&keys(), Callsign::Alpha, &sealed).unwrap();
        assert_eq!(opened, original);
    }

    #[test]
    fn test_pad_moved_to_other_user_is_rejected() {
        let sealed = seal_pad(&keys(), Callsign::Alpha, &pad(3)).unwrap();
        let err = open_pad(&keys(), Callsign::Bravo, &sealed).unwrap_err();
        assert!(err.is_tamper());
    }

    #[test]
    fn test_pad_renumbered_is_rejected() {
        let mut sealed = seal_pad(&keys(), Callsign::Alpha, &pad(3)).unwrap();
        sealed.pad_number = 4;
        assert!(open_pad(&keys(), Callsign::Alpha, &sealed).is_err());
    }

    #[test]
    fn test_pad_tampered_identifier_is_rejected() {
        let mut sealed = seal_pad(&keys(), Callsign::Charlie, &pad(3)).unwrap();
        let mut id = *sealed.identifier.as_bytes();
        id[0] ^= 1;
        sealed.identifier = PadIdentifier::from_bytes(id);
        assert!(open_pad(&keys(), Callsign::Charlie, &sealed).is_err());
    }

    #[test]
    fn test_same_pad_bytes_different_numbers_encrypt_differently() {
        let bytes = *pad(0).as_bytes();
        let a = seal_pad(&keys(), Callsign::Alpha, &OneTimePad::new(1, bytes).unwrap()).unwrap();
        let b = seal_pad(&keys(), Callsign::Alpha, &OneTimePad::new(2, bytes).unwrap()).unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_info_roundtrip() {
        let mut info = BTreeMap::new();
        info.insert("server".to_string(), "https://relay.example/".to_string());
        let sealed = seal_info(&keys(), &info).unwrap();
        let opened: BTreeMap<String, String> = open_info(&keys(), &sealed).unwrap();
        assert_eq!(opened, info);
    }

    #[test]
    fn test_info_tamper_detected() {
        let sealed = seal_info(&keys(), &vec![1u32, 2, 3]).unwrap();
        let mut bad = sealed.clone();
        bad.ciphertext[0] ^= 4;
        assert!(open_info::<Vec<u32>>(&keys(), &bad).unwrap_err().is_tamper());

        let other_keys = DatabaseKeys::derive_from_master(&[0x43; 64]);
        assert!(open_info::<Vec<u32>>(&other_keys, &sealed).is_err());
    }
}
