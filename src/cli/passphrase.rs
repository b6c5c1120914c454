use crate::cascade::kdf::{
    cascade_pbkdf, passphrase_strength_bits, KdfParams, DEFAULT_KECCAK_ITERATIONS,
    DEFAULT_SKEIN_ITERATIONS, SALT_SIZE,
};
use crate::error::{FatalError, Result};
use crate::primitives::keccak512;
use rand::rngs::OsRng;
use rand::RngCore;

const CHECKSUM_SIZE: usize = 8;

/// Options for the passphrase command
#[derive(Debug, Clone)]
pub struct PassphraseOptions {
    pub keccak_iterations: u32,
    pub skein_iterations: u32,
    /// Random when not given
    pub salt: Option<Vec<u8>>,
}

impl Default for PassphraseOptions {
    fn default() -> Self {
        Self {
            keccak_iterations: DEFAULT_KECCAK_ITERATIONS,
            skein_iterations: DEFAULT_SKEIN_ITERATIONS,
            salt: None,
        }
    }
}

/// Estimate passphrase strength and derive a short checksum of the master
/// key, so two people can confirm they typed the same passphrase without
/// revealing it
pub fn analyse_passphrase(passphrase: &str, options: &PassphraseOptions) -> Result<String> {
    let salt = match &options.salt {
        Some(salt) => salt.clone(),
        None => {
            let mut salt = vec![0u8; SALT_SIZE];
            OsRng
                .try_fill_bytes(&mut salt)
                .map_err(|e| FatalError::EntropySource(e.to_string()))?;
            salt
        }
    };
    let params = KdfParams {
        salt,
        keccak_iterations: options.keccak_iterations,
        skein_iterations: options.skein_iterations,
    };
    let master = cascade_pbkdf(passphrase, &params)?;
    let checksum = keccak512(&[&master[..]]);
    let bits = passphrase_strength_bits(
        passphrase,
        options.keccak_iterations,
        options.skein_iterations,
    );

    let mut output = String::new();
    output.push_str(&format!("Length: {} characters\n", passphrase.chars().count()));
    output.push_str(&format!("Strength: {} bits\n", bits));
    output.push_str(&format!(
        "Iterations: {} Keccak, {} Skein\n",
        params.keccak_iterations, params.skein_iterations
    ));
    output.push_str(&format!("Salt: {}\n", hex::encode(&params.salt)));
    output.push_str(&format!("Checksum: {}\n", hex::encode(&checksum[..CHECKSUM_SIZE])));
    Ok(output)
}
