use crate::error::{JerichoError, Result};
use crate::primitives::{skein512, Digest512};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const GROUP_IDENTIFIER_SIZE: usize = 8;

/// Shared secret configured on the relay and every group member
pub const GROUP_KEY_SIZE: usize = 64;

/// Public tag the relay uses to pick the group's key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupIdentifier([u8; GROUP_IDENTIFIER_SIZE]);

impl GroupIdentifier {
    pub fn from_bytes(bytes: [u8; GROUP_IDENTIFIER_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; GROUP_IDENTIFIER_SIZE] = bytes.try_into().map_err(|_| {
            JerichoError::InvalidConfig(format!(
                "group identifier must be {} bytes, got {}",
                GROUP_IDENTIFIER_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_slice(&hex::decode(s.trim())?)
    }

    pub fn as_bytes(&self) -> &[u8; GROUP_IDENTIFIER_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for GroupIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupIdentifier({})", self.to_hex())
    }
}

impl fmt::Display for GroupIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Encryption and MAC keys split from the group key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct GroupKeys {
    #[zeroize(skip)]
    identifier: GroupIdentifier,
    encryption: Digest512,
    mac: Digest512,
}

impl fmt::Debug for GroupKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupKeys")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl GroupKeys {
    /// `Skein512(groupKey || u32be(0))` encrypts, `Skein512(groupKey || u32be(1))` authenticates
    pub fn derive(identifier: GroupIdentifier, group_key: &[u8]) -> Result<Self> {
        if group_key.len() != GROUP_KEY_SIZE {
            return Err(JerichoError::InvalidConfig(format!(
                "group key must be {} bytes, got {}",
                GROUP_KEY_SIZE,
                group_key.len()
            )));
        }

        Ok(Self {
            identifier,
            encryption: skein512(&[group_key, &0u32.to_be_bytes()]),
            mac: skein512(&[group_key, &1u32.to_be_bytes()]),
        })
    }

    pub fn identifier(&self) -> GroupIdentifier {
        self.identifier
    }

    pub fn encryption_key(&self) -> &Digest512 {
        &self.encryption
    }

    pub fn mac_key(&self) -> &Digest512 {
        &self.mac
    }
}
