use crate::cascade::cipher::{cascade_encrypt, CascadeNonces};
use crate::cascade::mac::{cascade_mac, verify_cascade_mac};
use crate::error::{FatalError, JerichoError, Result};
use crate::primitives::{
    keccak512, skein512, xor_arrays, Digest512, AES_KEY_SIZE, DIGEST_SIZE, SALSA_KEY_SIZE,
};
use rand::{CryptoRng, RngCore};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// 512-bit key derived from the passphrase
pub type MasterKey = Zeroizing<Digest512>;

/// Serialized size of a full key set: aes || salsa || keccak || skein
pub const DATABASE_KEYS_SIZE: usize = AES_KEY_SIZE + SALSA_KEY_SIZE + DIGEST_SIZE * 2;

/// Keys for the two stream ciphers
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKeys {
    pub aes: [u8; AES_KEY_SIZE],
    pub salsa: [u8; SALSA_KEY_SIZE],
}

/// Keys for the two keyed hashes
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MacKeys {
    pub keccak: [u8; DIGEST_SIZE],
    pub skein: [u8; DIGEST_SIZE],
}

/// One complete set of cascade keys. The same shape serves both as the
/// working keys that protect pads and as the sub keys derived from a master
/// key that protect the working keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DatabaseKeys {
    pub cipher: CipherKeys,
    pub mac: MacKeys,
}

impl fmt::Debug for DatabaseKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DatabaseKeys { .. }")
    }
}

impl DatabaseKeys {
    /// Fresh random working keys
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; DATABASE_KEYS_SIZE]);
        rng.try_fill_bytes(&mut bytes[..])
            .map_err(|e| FatalError::EntropySource(e.to_string()))?;
        Self::from_bytes(&bytes[..])
    }

    /// Derive four sub keys from a master key. Key `i` is
    /// `Keccak512(master || i) XOR Skein512(master || i)` with a 32-bit
    /// big-endian counter running 1 to 4; the cipher keys keep the first
    /// 256 bits.
    pub fn derive_from_master(master: &Digest512) -> Self {
        let derived: Vec<Zeroizing<Digest512>> = (1u32..=4)
            .map(|i| {
                let counter = i.to_be_bytes();
                let a = keccak512(&[master, &counter]);
                let b = skein512(&[master, &counter]);
                Zeroizing::new(xor_arrays(&a, &b))
            })
            .collect();

        let mut aes = [0u8; AES_KEY_SIZE];
        aes.copy_from_slice(&derived[0][..AES_KEY_SIZE]);
        let mut salsa = [0u8; SALSA_KEY_SIZE];
        salsa.copy_from_slice(&derived[1][..SALSA_KEY_SIZE]);

        Self {
            cipher: CipherKeys { aes, salsa },
            mac: MacKeys {
                keccak: *derived[2],
                skein: *derived[3],
            },
        }
    }

    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(DATABASE_KEYS_SIZE));
        out.extend_from_slice(&self.cipher.aes);
        out.extend_from_slice(&self.cipher.salsa);
        out.extend_from_slice(&self.mac.keccak);
        out.extend_from_slice(&self.mac.skein);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != DATABASE_KEYS_SIZE {
            return Err(JerichoError::InvalidPacket(format!(
                "database keys must be {} bytes, got {}",
                DATABASE_KEYS_SIZE,
                bytes.len()
            )));
        }

        let (aes_bytes, rest) = bytes.split_at(AES_KEY_SIZE);
        let (salsa_bytes, rest) = rest.split_at(SALSA_KEY_SIZE);
        let (keccak_bytes, skein_bytes) = rest.split_at(DIGEST_SIZE);

        let mut keys = Self {
            cipher: CipherKeys {
                aes: [0u8; AES_KEY_SIZE],
                salsa: [0u8; SALSA_KEY_SIZE],
            },
            mac: MacKeys {
                keccak: [0u8; DIGEST_SIZE],
                skein: [0u8; DIGEST_SIZE],
            },
        };
        keys.cipher.aes.copy_from_slice(aes_bytes);
        keys.cipher.salsa.copy_from_slice(salsa_bytes);
        keys.mac.keccak.copy_from_slice(keccak_bytes);
        keys.mac.skein.copy_from_slice(skein_bytes);
        Ok(keys)
    }

    /// Encrypt and MAC these working keys under sub keys of `master`.
    /// Changing the passphrase only needs this blob redone.
    pub fn seal(&self, master: &Digest512) -> Result<SealedKeys> {
        let sub_keys = Self::derive_from_master(master);
        let plaintext = self.to_bytes();
        let ciphertext = cascade_encrypt(&sub_keys.cipher, &CascadeNonces::ZERO, &plaintext)?;
        let mac = cascade_mac(&sub_keys.mac, &ciphertext);
        Ok(SealedKeys {
            ciphertext,
            mac: mac.to_vec(),
        })
    }
}

/// Working keys encrypted under a passphrase-derived master key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedKeys {
    pub ciphertext: Vec<u8>,
    pub mac: Vec<u8>,
}

impl SealedKeys {
    /// Verify then decrypt. A wrong passphrase surfaces here as a MAC failure.
    pub fn open(&self, master: &Digest512) -> Result<DatabaseKeys> {
        let sub_keys = DatabaseKeys::derive_from_master(master);
        if !verify_cascade_mac(&sub_keys.mac, &self.ciphertext, &self.mac) {
            tracing::warn!("database keys failed MAC verification");
            return Err(JerichoError::MacVerificationFailed("database keys".into()));
        }
        let plaintext = Zeroizing::new(cascade_encrypt(
            &sub_keys.cipher,
            &CascadeNonces::ZERO,
            &self.ciphertext,
        )?);
        DatabaseKeys::from_bytes(&plaintext)
    }
}
