use crate::cascade::keys::MasterKey;
use crate::error::{JerichoError, Result};
use crate::primitives::{xor_arrays, Digest512, DIGEST_SIZE};
use digest::Digest;
use hmac::SimpleHmac;
use sha3::Keccak512;
use skein::consts::U64;
use skein::Skein512;
use zeroize::Zeroizing;

/// Size of the random PBKDF salt in bytes
pub const SALT_SIZE: usize = 192;

pub const DEFAULT_KECCAK_ITERATIONS: u32 = 10_000;
pub const DEFAULT_SKEIN_ITERATIONS: u32 = 10_000;

/// Characters assumed available per passphrase symbol (A-Z, a-z, 0-9)
const PASSPHRASE_ALPHABET: f64 = 62.0;

/// Salt and iteration counts for the cascaded passphrase KDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    pub salt: Vec<u8>,
    pub keccak_iterations: u32,
    pub skein_iterations: u32,
}

impl KdfParams {
    pub fn validate(&self) -> Result<()> {
        if self.salt.is_empty() {
            return Err(JerichoError::InvalidConfig("PBKDF salt is empty".into()));
        }
        if self.keccak_iterations == 0 || self.skein_iterations == 0 {
            return Err(JerichoError::InvalidConfig(
                "PBKDF iteration counts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Minimal big-endian bytes of `value`, at least one byte. Appended to the
/// salt so every iteration count needs its own precomputation.
pub fn integer_to_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

fn salted(salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut out = salt.to_vec();
    out.extend_from_slice(&integer_to_bytes(iterations as u64));
    out
}

/// PBKDF2 with HMAC-Keccak-512, 512-bit output
pub fn keccak_pbkdf(password: &[u8], salt: &[u8], iterations: u32) -> Result<MasterKey> {
    let mut out = Zeroizing::new([0u8; DIGEST_SIZE]);
    pbkdf2::pbkdf2::<SimpleHmac<Keccak512>>(password, salt, iterations, &mut out[..])
        .map_err(|e| JerichoError::InvalidConfig(format!("PBKDF2: {}", e)))?;
    Ok(out)
}

/// Skein repetition KDF: Skein-512 over `salt || password` repeated
/// `iterations` times. Every Skein block carries a distinct tweak so the
/// long input cannot fall into a cycle. The input is streamed rather than
/// materialised.
pub fn skein_pbkdf(password: &[u8], salt: &[u8], iterations: u32) -> MasterKey {
    let mut hasher = Skein512::<U64>::new();
    for _ in 0..iterations {
        Digest::update(&mut hasher, salt);
        Digest::update(&mut hasher, password);
    }
    let mut out = Zeroizing::new([0u8; DIGEST_SIZE]);
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Cascaded passphrase derivation:
///
/// ```text
/// KeyA  = PBKDF2-Keccak(password, salt || keccakIterations)
/// KeyB  = SkeinKDF(password || KeyA, salt || skeinIterations)
/// final = KeyA XOR KeyB
/// ```
///
/// KeyB cannot start until KeyA is known, and a weakness in either
/// function leaves the other's strength intact.
pub fn cascade_pbkdf(passphrase: &str, params: &KdfParams) -> Result<MasterKey> {
    params.validate()?;

    let password = passphrase.as_bytes();
    let key_a = keccak_pbkdf(
        password,
        &salted(&params.salt, params.keccak_iterations),
        params.keccak_iterations,
    )?;

    let mut password_and_key = Zeroizing::new(Vec::with_capacity(password.len() + DIGEST_SIZE));
    password_and_key.extend_from_slice(password);
    password_and_key.extend_from_slice(&key_a[..]);

    let key_b = skein_pbkdf(
        &password_and_key,
        &salted(&params.salt, params.skein_iterations),
        params.skein_iterations,
    );

    let combined: Digest512 = xor_arrays(&*key_a, &*key_b);
    Ok(Zeroizing::new(combined))
}

/// Conservative strength estimate in bits: each character is worth
/// log2(62) and the iterations add log2(total iterations).
pub fn passphrase_strength_bits(
    passphrase: &str,
    keccak_iterations: u32,
    skein_iterations: u32,
) -> u32 {
    let length = passphrase.chars().count() as f64;
    let iterations = (keccak_iterations as f64 + skein_iterations as f64).max(1.0);
    let bits = length * PASSPHRASE_ALPHABET.log2() + iterations.log2();
    bits.floor() as u32
}
