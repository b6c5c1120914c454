use crate::cascade::keys::CipherKeys;
use crate::error::Result;
use crate::primitives::{
    aes_ctr_keystream, salsa20_keystream, xor_bytes, AES_NONCE_SIZE, SALSA_NONCE_SIZE,
};

/// Nonce pair for the two stream ciphers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeNonces {
    pub aes: [u8; AES_NONCE_SIZE],
    pub salsa: [u8; SALSA_NONCE_SIZE],
}

impl CascadeNonces {
    /// Used for the working-keys blob, which is encrypted under keys that
    /// never encrypt anything else
    pub const ZERO: Self = Self {
        aes: [0u8; AES_NONCE_SIZE],
        salsa: [0u8; SALSA_NONCE_SIZE],
    };

    /// Used for the pad info blob. Pad numbers can never reach this value.
    pub const INFO: Self = Self {
        aes: [0xff; AES_NONCE_SIZE],
        salsa: [0xff; SALSA_NONCE_SIZE],
    };

    /// Nonces for a pad: the pad number as a 96-bit big-endian integer for
    /// AES, and its low 64 bits for Salsa20. Unique pad numbers give unique
    /// nonces without storing them.
    pub fn for_pad(pad_number: u64) -> Self {
        let mut aes = [0u8; AES_NONCE_SIZE];
        aes[AES_NONCE_SIZE - 8..].copy_from_slice(&pad_number.to_be_bytes());
        let mut salsa = [0u8; SALSA_NONCE_SIZE];
        salsa.copy_from_slice(&aes[AES_NONCE_SIZE - SALSA_NONCE_SIZE..]);
        Self { aes, salsa }
    }

    /// aes nonce || salsa nonce, as covered by the MAC
    pub fn to_bytes(&self) -> [u8; AES_NONCE_SIZE + SALSA_NONCE_SIZE] {
        let mut out = [0u8; AES_NONCE_SIZE + SALSA_NONCE_SIZE];
        out[..AES_NONCE_SIZE].copy_from_slice(&self.aes);
        out[AES_NONCE_SIZE..].copy_from_slice(&self.salsa);
        out
    }
}

/// XOR `data` with AES-CTR and Salsa20 keystreams. Encryption and
/// decryption are the same operation.
pub fn cascade_encrypt(keys: &CipherKeys, nonces: &CascadeNonces, data: &[u8]) -> Result<Vec<u8>> {
    let aes_stream = aes_ctr_keystream(&keys.aes, &nonces.aes, data.len());
    let salsa_stream = salsa20_keystream(&keys.salsa, &nonces.salsa, data.len());
    let combined = xor_bytes(&aes_stream, &salsa_stream)?;
    xor_bytes(&combined, data)
}
