//! One-time pads, the per-message codec and the pad inventory.
//!
//! Pad layout: `identifier[0..7] || message region[7..128] || MAC mask[128..192]`

pub mod codec;
pub mod store;

pub use codec::*;
pub use store::*;

use crate::error::{JerichoError, Result};
use crate::primitives::DIGEST_SIZE;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Full pad size in bytes (1536 bits)
pub const PAD_SIZE: usize = 192;

/// Public lookup prefix, never used as key material
pub const PAD_IDENTIFIER_SIZE: usize = 7;

/// Maximum plaintext bytes per message
pub const MESSAGE_SIZE: usize = 115;
pub const MESSAGE_LENGTH_SIZE: usize = 1;
pub const MESSAGE_TIMESTAMP_SIZE: usize = 5;

/// message || length || timestamp
pub const MESSAGE_PARTS_SIZE: usize = MESSAGE_SIZE + MESSAGE_LENGTH_SIZE + MESSAGE_TIMESTAMP_SIZE;

/// identifier || encrypted message parts
pub const CIPHERTEXT_SIZE: usize = PAD_IDENTIFIER_SIZE + MESSAGE_PARTS_SIZE;

pub const MAC_SIZE: usize = DIGEST_SIZE;

/// ciphertext || encrypted MAC
pub const MESSAGE_PACKET_SIZE: usize = CIPHERTEXT_SIZE + MAC_SIZE;

/// Pad numbers stay within the range of an IEEE double's exact integers
pub const MAX_PAD_NUMBER: u64 = (1 << 53) - 1;

/// Byte whose parity decides whether message parts are bit-reversed
const REVERSAL_BYTE: usize = PAD_SIZE - 2;

/// Byte whose value selects the message MAC algorithm
const MAC_SELECTOR_BYTE: usize = PAD_SIZE - 1;

const _: () = assert!(MESSAGE_PACKET_SIZE == PAD_SIZE);

/// Unencrypted 56-bit pad tag
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadIdentifier([u8; PAD_IDENTIFIER_SIZE]);

impl PadIdentifier {
    pub fn from_bytes(bytes: [u8; PAD_IDENTIFIER_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; PAD_IDENTIFIER_SIZE] = bytes.try_into().map_err(|_| {
            JerichoError::InvalidPad(format!(
                "identifier must be {} bytes, got {}",
                PAD_IDENTIFIER_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_slice(&hex::decode(s)?)
    }

    pub fn as_bytes(&self) -> &[u8; PAD_IDENTIFIER_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PadIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PadIdentifier({})", self.to_hex())
    }
}

impl fmt::Display for PadIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A single-use key. Consumed pads are removed from the store and dropped,
/// which wipes the key material.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct OneTimePad {
    number: u64,
    bytes: [u8; PAD_SIZE],
}

impl fmt::Debug for OneTimePad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneTimePad")
            .field("number", &self.number)
            .field("identifier", &self.identifier())
            .finish_non_exhaustive()
    }
}

impl OneTimePad {
    pub fn new(number: u64, bytes: [u8; PAD_SIZE]) -> Result<Self> {
        if number > MAX_PAD_NUMBER {
            return Err(JerichoError::InvalidPad(format!(
                "pad number {} exceeds {}",
                number, MAX_PAD_NUMBER
            )));
        }
        Ok(Self { number, bytes })
    }

    pub fn from_slice(number: u64, bytes: &[u8]) -> Result<Self> {
        let array: [u8; PAD_SIZE] = bytes.try_into().map_err(|_| {
            JerichoError::InvalidPad(format!("pad must be {} bytes, got {}", PAD_SIZE, bytes.len()))
        })?;
        Self::new(number, array)
    }

    /// Parse a 384-character hex pad
    pub fn from_hex(number: u64, s: &str) -> Result<Self> {
        let bytes = zeroize::Zeroizing::new(hex::decode(s.trim())?);
        Self::from_slice(number, &bytes)
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn as_bytes(&self) -> &[u8; PAD_SIZE] {
        &self.bytes
    }

    pub fn identifier(&self) -> PadIdentifier {
        let mut id = [0u8; PAD_IDENTIFIER_SIZE];
        id.copy_from_slice(&self.bytes[..PAD_IDENTIFIER_SIZE]);
        PadIdentifier(id)
    }

    /// Key material XORed with the message parts
    pub fn message_region(&self) -> &[u8] {
        &self.bytes[PAD_IDENTIFIER_SIZE..CIPHERTEXT_SIZE]
    }

    /// Key material XORed with the message MAC
    pub fn mac_region(&self) -> &[u8] {
        &self.bytes[CIPHERTEXT_SIZE..]
    }

    /// Whether the message parts are bit-reversed before encryption
    pub fn reverses_message(&self) -> bool {
        self.bytes[REVERSAL_BYTE] % 2 == 1
    }

    pub fn mac_algorithm(&self) -> crate::primitives::HashAlgorithm {
        match self.bytes[MAC_SELECTOR_BYTE] % 2 {
            0 => crate::primitives::HashAlgorithm::Skein,
            _ => crate::primitives::HashAlgorithm::Keccak,
        }
    }
}

/// An encrypted, authenticated message as carried in network packets
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MessagePacket([u8; MESSAGE_PACKET_SIZE]);

impl MessagePacket {
    pub fn from_bytes(bytes: [u8; MESSAGE_PACKET_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; MESSAGE_PACKET_SIZE] = bytes.try_into().map_err(|_| {
            JerichoError::InvalidPacket(format!(
                "message packet must be {} bytes, got {}",
                MESSAGE_PACKET_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_slice(&hex::decode(s.trim())?)
    }

    pub fn as_bytes(&self) -> &[u8; MESSAGE_PACKET_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Public prefix used to find the decrypting pad
    pub fn identifier(&self) -> PadIdentifier {
        let mut id = [0u8; PAD_IDENTIFIER_SIZE];
        id.copy_from_slice(&self.0[..PAD_IDENTIFIER_SIZE]);
        PadIdentifier(id)
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.0[..CIPHERTEXT_SIZE]
    }

    pub fn encrypted_mac(&self) -> &[u8] {
        &self.0[CIPHERTEXT_SIZE..]
    }
}

impl fmt::Debug for MessagePacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessagePacket({}..)", self.identifier())
    }
}

/// Current UTC time in whole seconds
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::HashAlgorithm;

    fn pad_with_tail(second_last: u8, last: u8) -> OneTimePad {
        let mut bytes = [0u8; PAD_SIZE];
        bytes[PAD_SIZE - 2] = second_last;
        bytes[PAD_SIZE - 1] = last;
        OneTimePad::new(1, bytes).unwrap()
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(MESSAGE_PARTS_SIZE, 121);
        assert_eq!(CIPHERTEXT_SIZE, 128);
        assert_eq!(MESSAGE_PACKET_SIZE, 192);
    }

    #[test]
    fn test_regions() {
        let mut bytes = [0u8; PAD_SIZE];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = i as u8;
        }
        let pad = OneTimePad::new(5, bytes).unwrap();
        assert_eq!(pad.identifier().as_bytes(), &[0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(pad.message_region().len(), MESSAGE_PARTS_SIZE);
        assert_eq!(pad.message_region()[0], 7);
        assert_eq!(pad.mac_region().len(), MAC_SIZE);
        assert_eq!(pad.mac_region()[0], 128);
    }

    #[test]
    fn test_selectors_follow_pad_bytes() {
        assert!(!pad_with_tail(0x10, 0).reverses_message());
        assert!(pad_with_tail(0x11, 0).reverses_message());
        assert_eq!(pad_with_tail(0, 0x20).mac_algorithm(), HashAlgorithm::Skein);
        assert_eq!(pad_with_tail(0, 0x21).mac_algorithm(), HashAlgorithm::Keccak);
    }

    #[test]
    fn test_pad_number_limit() {
        assert!(OneTimePad::new(MAX_PAD_NUMBER, [0u8; PAD_SIZE]).is_ok());
        assert!(OneTimePad::new(MAX_PAD_NUMBER + 1, [0u8; PAD_SIZE]).is_err());
    }

    #[test]
    fn test_hex_parsing() {
        let pad = OneTimePad::from_hex(1, &"ab".repeat(PAD_SIZE)).unwrap();
        assert_eq!(pad.as_bytes()[100], 0xab);
        assert!(OneTimePad::from_hex(1, &"ab".repeat(PAD_SIZE - 1)).is_err());
        assert!(OneTimePad::from_hex(1, "zz").is_err());

        let id = PadIdentifier::from_hex("00112233445566").unwrap();
        assert_eq!(id.to_string(), "00112233445566");
        assert!(PadIdentifier::from_hex("0011").is_err());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let pad = OneTimePad::new(9, [0xcd; PAD_SIZE]).unwrap();
        let printed = format!("{:?}", pad);
        assert!(printed.contains("cdcdcdcdcdcdcd"));
        assert!(!printed.contains(&"cd".repeat(8)));
    }
}
