//! Hash, stream cipher and XOR building blocks shared by every layer.
//!
//! The hash functions are original Keccak-512 (as deployed before the SHA-3
//! padding change) and Skein-512-512. The stream ciphers are AES-256 in
//! counter mode and Salsa20/20. Every composition in the crate is expressed
//! in terms of the functions here.

use crate::error::{FatalError, JerichoError, Result};
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher};
use digest::Digest;
use salsa20::Salsa20;
use serde::{Deserialize, Serialize};
use sha3::Keccak512;
use skein::consts::U64;
use skein::Skein512;

/// Output size of both hash families in bytes
pub const DIGEST_SIZE: usize = 64;

pub type Digest512 = [u8; DIGEST_SIZE];

/// AES-256 with a 96-bit nonce and 32-bit big-endian block counter
type Aes256Ctr = ctr::Ctr32BE<aes::Aes256>;

pub const AES_KEY_SIZE: usize = 32;
pub const AES_NONCE_SIZE: usize = 12;
pub const SALSA_KEY_SIZE: usize = 32;
pub const SALSA_NONCE_SIZE: usize = 8;

/// Hash family selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Skein,
    Keccak,
}

impl std::str::FromStr for HashAlgorithm {
    type Err = JerichoError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "skein" | "skein-512" => Ok(Self::Skein),
            "keccak" | "keccak-512" => Ok(Self::Keccak),
            _ => Err(JerichoError::UnsupportedAlgorithm(format!("hash: {}", s))),
        }
    }
}

impl HashAlgorithm {
    /// Hash the concatenation of `parts`
    pub fn digest(self, parts: &[&[u8]]) -> Digest512 {
        match self {
            HashAlgorithm::Skein => skein512(parts),
            HashAlgorithm::Keccak => keccak512(parts),
        }
    }
}

fn finish<D: Digest>(mut hasher: D, parts: &[&[u8]]) -> Digest512 {
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; DIGEST_SIZE];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Skein-512 over the concatenation of `parts`
pub fn skein512(parts: &[&[u8]]) -> Digest512 {
    finish(Skein512::<U64>::new(), parts)
}

/// Original Keccak-512 over the concatenation of `parts`
pub fn keccak512(parts: &[&[u8]]) -> Digest512 {
    finish(Keccak512::new(), parts)
}

/// AES-256-CTR keystream starting at block counter zero
pub fn aes_ctr_keystream(
    key: &[u8; AES_KEY_SIZE],
    nonce: &[u8; AES_NONCE_SIZE],
    length: usize,
) -> Vec<u8> {
    let mut iv = [0u8; 16];
    iv[..AES_NONCE_SIZE].copy_from_slice(nonce);

    let mut cipher = Aes256Ctr::new(GenericArray::from_slice(key), GenericArray::from_slice(&iv));
    let mut stream = vec![0u8; length];
    cipher.apply_keystream(&mut stream);
    stream
}

/// Salsa20/20 keystream starting at block counter zero
pub fn salsa20_keystream(
    key: &[u8; SALSA_KEY_SIZE],
    nonce: &[u8; SALSA_NONCE_SIZE],
    length: usize,
) -> Vec<u8> {
    let mut cipher = Salsa20::new(GenericArray::from_slice(key), GenericArray::from_slice(nonce));
    let mut stream = vec![0u8; length];
    cipher.apply_keystream(&mut stream);
    stream
}

/// XOR two equal-length operands. A length mismatch is a fatal invariant
/// violation, never silently truncated.
pub fn xor_bytes(left: &[u8], right: &[u8]) -> Result<Vec<u8>> {
    if left.len() != right.len() {
        tracing::error!(left = left.len(), right = right.len(), "XOR operand length mismatch");
        return Err(FatalError::XorLengthMismatch {
            left: left.len(),
            right: right.len(),
        }
        .into());
    }
    Ok(left.iter().zip(right).map(|(a, b)| a ^ b).collect())
}

/// XOR `mask` into `target` with the same length rule as [`xor_bytes`]
pub fn xor_in_place(target: &mut [u8], mask: &[u8]) -> Result<()> {
    if target.len() != mask.len() {
        tracing::error!(left = target.len(), right = mask.len(), "XOR operand length mismatch");
        return Err(FatalError::XorLengthMismatch {
            left: target.len(),
            right: mask.len(),
        }
        .into());
    }
    for (byte, m) in target.iter_mut().zip(mask) {
        *byte ^= m;
    }
    Ok(())
}

/// XOR two fixed-size arrays
pub fn xor_arrays<const N: usize>(left: &[u8; N], right: &[u8; N]) -> [u8; N] {
    let mut out = [0u8; N];
    for i in 0..N {
        out[i] = left[i] ^ right[i];
    }
    out
}

/// Constant-time comparison to prevent timing attacks
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_parts_equal_concatenation() {
        let joined = skein512(&[b"hello world"]);
        let split = skein512(&[b"hello", b" ", b"world"]);
        assert_eq!(joined, split);

        let joined = keccak512(&[b"abcdef"]);
        let split = keccak512(&[b"abc", b"def"]);
        assert_eq!(joined, split);
    }

    #[test]
    fn test_keccak_is_not_sha3() {
        use sha3::Sha3_512;
        let sha3: [u8; 64] = {
            let mut out = [0u8; 64];
            out.copy_from_slice(&Sha3_512::digest(b""));
            out
        };
        assert_ne!(keccak512(&[b""]), sha3);
    }

    #[test]
    fn test_keccak_empty_vector() {
        // Keccak-512("") from the Keccak team's reference vectors
        let expected = "0eab42de4c3ceb9235fc91acffe746b29c29a8c366b7c60e4e67c466f36a4304\
                        c00fa9caf9d87976ba469bcbe06713b435f091ef2769fb160cdab33d3670680e";
        assert_eq!(hex::encode(keccak512(&[b""])), expected);
    }

    #[test]
    fn test_families_differ() {
        assert_ne!(
            HashAlgorithm::Skein.digest(&[b"data"]),
            HashAlgorithm::Keccak.digest(&[b"data"])
        );
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("skein-512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Skein);
        assert_eq!("KECCAK".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Keccak);
        assert!("md5".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_keystreams_are_prefix_stable() {
        let key = [7u8; 32];
        let long = aes_ctr_keystream(&key, &[1u8; 12], 100);
        let short = aes_ctr_keystream(&key, &[1u8; 12], 40);
        assert_eq!(&long[..40], &short[..]);

        let long = salsa20_keystream(&key, &[2u8; 8], 100);
        let short = salsa20_keystream(&key, &[2u8; 8], 40);
        assert_eq!(&long[..40], &short[..]);
    }

    #[test]
    fn test_keystream_depends_on_nonce() {
        let key = [9u8; 32];
        assert_ne!(
            aes_ctr_keystream(&key, &[0u8; 12], 32),
            aes_ctr_keystream(&key, &[1u8; 12], 32)
        );
        assert_ne!(
            salsa20_keystream(&key, &[0u8; 8], 32),
            salsa20_keystream(&key, &[1u8; 8], 32)
        );
    }

    #[test]
    fn test_xor_length_mismatch_is_fatal() {
        let err = xor_bytes(&[1, 2, 3], &[1, 2]).unwrap_err();
        assert!(err.is_fatal());

        let mut target = [0u8; 4];
        assert!(xor_in_place(&mut target, &[1u8; 5]).unwrap_err().is_fatal());
    }

    #[test]
    fn test_xor_involution() {
        let data = b"attack at dawn".to_vec();
        let mask = vec![0x5au8; data.len()];
        let once = xor_bytes(&data, &mask).unwrap();
        assert_eq!(xor_bytes(&once, &mask).unwrap(), data);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abc", b"abc"));
        assert!(!constant_time_compare(b"abc", b"abd"));
        assert!(!constant_time_compare(b"abc", b"ab"));
    }
}
