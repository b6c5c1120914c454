//! Failsafe random number generator.
//!
//! Bytes from the operating system RNG are XORed with a Salsa20 keystream
//! under a per-user key loaded from the pad database. If the platform RNG is
//! backdoored or broken, the output is still as strong as Salsa20 under a key
//! the attacker does not know. The 64-bit nonce advances after every draw and
//! is persisted with the pad info so it is never reused.

use crate::error::{FatalError, JerichoError, Result};
use crate::primitives::{salsa20_keystream, SALSA_KEY_SIZE};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

pub struct FailsafeRng {
    key: Option<Zeroizing<[u8; SALSA_KEY_SIZE]>>,
    nonce: u64,
}

impl FailsafeRng {
    pub fn new(key: [u8; SALSA_KEY_SIZE], nonce: u64) -> Self {
        Self {
            key: Some(Zeroizing::new(key)),
            nonce,
        }
    }

    /// A generator with no key. Any draw fails with a fatal error.
    pub fn uninitialised() -> Self {
        Self { key: None, nonce: 0 }
    }

    /// Key a fresh generator straight from the OS RNG. Used before a pad
    /// database has been loaded.
    pub fn temporary() -> Self {
        let mut key = [0u8; SALSA_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        tracing::info!("generated a temporary failsafe RNG key");
        Self::new(key, 0)
    }

    pub fn is_initialised(&self) -> bool {
        self.key.is_some()
    }

    /// Next nonce to be used; persist this alongside the key
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    fn try_fill(&mut self, dest: &mut [u8]) -> std::result::Result<(), FatalError> {
        let key = self.key.as_ref().ok_or_else(|| {
            tracing::error!("failsafe RNG used before a key was loaded");
            FatalError::RngNotInitialised
        })?;

        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| FatalError::EntropySource(e.to_string()))?;

        let stream = salsa20_keystream(key, &self.nonce.to_be_bytes(), dest.len());
        for (byte, k) in dest.iter_mut().zip(stream.iter()) {
            *byte ^= k;
        }
        self.nonce = self.nonce.wrapping_add(1);
        Ok(())
    }

    /// Fill `dest` with whitened random bytes
    pub fn fill(&mut self, dest: &mut [u8]) -> Result<()> {
        Ok(self.try_fill(dest)?)
    }

    pub fn random_bytes(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; length];
        self.fill(&mut out)?;
        Ok(out)
    }

    /// Uniform integer in `min..=max` by rejection sampling
    pub fn random_int_in_range(&mut self, min: u64, max: u64) -> Result<u64> {
        random_int_in_range(self, min, max)
    }
}

/// Uniform integer in `min..=max` drawn from any RNG, without modulo bias
pub fn random_int_in_range<R: RngCore + ?Sized>(rng: &mut R, min: u64, max: u64) -> Result<u64> {
    if min > max {
        return Err(JerichoError::InvalidConfig(format!(
            "random range {}..={} is empty",
            min, max
        )));
    }

    let range = match (max - min).checked_add(1) {
        Some(r) => r,
        None => return Ok(rng.try_next_u64()?),
    };

    // Largest multiple of `range` that fits; draws at or above it are rejected
    let zone = (u64::MAX / range) * range;
    loop {
        let value = rng.try_next_u64()?;
        if value < zone {
            return Ok(min + value % range);
        }
    }
}

/// `length` bytes from any RNG, surfacing generator failure as fatal
pub fn random_vec<R: RngCore + ?Sized>(rng: &mut R, length: usize) -> Result<Vec<u8>> {
    let mut out = vec![0u8; length];
    rng.try_fill_bytes(&mut out)
        .map_err(|e| JerichoError::Fatal(FatalError::EntropySource(e.to_string())))?;
    Ok(out)
}

/// Fallible u64 draw so a broken generator surfaces as an error
trait TryNextU64 {
    fn try_next_u64(&mut self) -> Result<u64>;
}

impl<R: RngCore + ?Sized> TryNextU64 for R {
    fn try_next_u64(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        self.try_fill_bytes(&mut bytes).map_err(|e| {
            JerichoError::Fatal(FatalError::EntropySource(e.to_string()))
        })?;
        Ok(u64::from_be_bytes(bytes))
    }
}

impl RngCore for FailsafeRng {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.fill_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.fill_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        // Infallible interface: an unkeyed or broken generator must abort
        if let Err(e) = self.try_fill(dest) {
            panic!("failsafe RNG failure: {}", e);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.try_fill(dest).map_err(rand::Error::new)
    }
}

impl CryptoRng for FailsafeRng {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialised_is_fatal() {
        let mut rng = FailsafeRng::uninitialised();
        let err = rng.random_bytes(16).unwrap_err();
        assert!(err.is_fatal());
        assert!(rng.try_fill_bytes(&mut [0u8; 4]).is_err());
    }

    #[test]
    #[should_panic(expected = "failsafe RNG failure")]
    fn test_uninitialised_panics_through_rngcore() {
        let mut rng = FailsafeRng::uninitialised();
        rng.next_u32();
    }

    #[test]
    fn test_nonce_advances_per_draw() {
        let mut rng = FailsafeRng::new([3u8; 32], 10);
        rng.random_bytes(64).unwrap();
        rng.random_bytes(1).unwrap();
        assert_eq!(rng.nonce(), 12);
    }

    #[test]
    fn test_outputs_differ() {
        let mut rng = FailsafeRng::new([1u8; 32], 0);
        let a = rng.random_bytes(32).unwrap();
        let b = rng.random_bytes(32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_random_int_in_range_bounds() {
        let mut rng = FailsafeRng::new([5u8; 32], 0);
        for _ in 0..500 {
            let n = rng.random_int_in_range(192, 576).unwrap();
            assert!((192..=576).contains(&n));
        }
        assert_eq!(rng.random_int_in_range(7, 7).unwrap(), 7);
        assert!(rng.random_int_in_range(8, 7).is_err());
        rng.random_int_in_range(0, u64::MAX).unwrap();
    }

    #[test]
    fn test_random_int_hits_both_ends() {
        let mut rng = FailsafeRng::new([6u8; 32], 0);
        let mut seen = [false; 4];
        for _ in 0..400 {
            seen[rng.random_int_in_range(1, 4).unwrap() as usize - 1] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
