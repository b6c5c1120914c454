use crate::error::{FatalError, Result};
use crate::pad::{
    MessagePacket, OneTimePad, CIPHERTEXT_SIZE, MESSAGE_LENGTH_SIZE, MESSAGE_PACKET_SIZE,
    MESSAGE_PARTS_SIZE, MESSAGE_SIZE, MESSAGE_TIMESTAMP_SIZE, PAD_IDENTIFIER_SIZE,
};
use crate::primitives::{constant_time_compare, xor_bytes, Digest512};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

const LENGTH_OFFSET: usize = MESSAGE_SIZE;
const TIMESTAMP_OFFSET: usize = MESSAGE_SIZE + MESSAGE_LENGTH_SIZE;

/// Result of decrypting one message. `valid` is false when the MAC did not
/// match, in which case the plaintext is always empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    pub plaintext: String,
    pub timestamp: u64,
    pub valid: bool,
}

impl DecryptedMessage {
    fn rejected() -> Self {
        Self {
            plaintext: String::new(),
            timestamp: 0,
            valid: false,
        }
    }
}

/// Reverse the whole bit string: byte order and the bits within each byte
fn reverse_bits(parts: &mut [u8]) {
    parts.reverse();
    for byte in parts.iter_mut() {
        *byte = byte.reverse_bits();
    }
}

fn message_mac(pad: &OneTimePad, ciphertext: &[u8]) -> Digest512 {
    pad.mac_algorithm().digest(&[pad.as_bytes(), ciphertext])
}

/// Encrypt and authenticate `plaintext` with a single pad.
///
/// Plaintext longer than 115 bytes is cut at the last whole character that
/// fits. The unused part of the message block is filled from `rng`, so
/// every packet has the same size.
pub fn encrypt_message<R: RngCore + CryptoRng + ?Sized>(
    plaintext: &str,
    pad: &OneTimePad,
    timestamp: u64,
    rng: &mut R,
) -> Result<MessagePacket> {
    let text = plaintext.as_bytes();
    let mut length = text.len().min(MESSAGE_SIZE);
    while !plaintext.is_char_boundary(length) {
        length -= 1;
    }
    if length < text.len() {
        tracing::debug!(original = text.len(), "truncating message to {} bytes", MESSAGE_SIZE);
    }

    let mut parts = Zeroizing::new([0u8; MESSAGE_PARTS_SIZE]);
    parts[..length].copy_from_slice(&text[..length]);
    rng.try_fill_bytes(&mut parts[length..MESSAGE_SIZE])
        .map_err(|e| FatalError::EntropySource(e.to_string()))?;
    parts[LENGTH_OFFSET] = length as u8;
    let ts = timestamp.to_be_bytes();
    parts[TIMESTAMP_OFFSET..].copy_from_slice(&ts[ts.len() - MESSAGE_TIMESTAMP_SIZE..]);

    if pad.reverses_message() {
        reverse_bits(&mut parts[..]);
    }

    let encrypted = xor_bytes(pad.message_region(), &parts[..])?;

    let mut packet = [0u8; MESSAGE_PACKET_SIZE];
    packet[..PAD_IDENTIFIER_SIZE].copy_from_slice(pad.identifier().as_bytes());
    packet[PAD_IDENTIFIER_SIZE..CIPHERTEXT_SIZE].copy_from_slice(&encrypted);

    let mac = message_mac(pad, &packet[..CIPHERTEXT_SIZE]);
    let encrypted_mac = xor_bytes(&mac, pad.mac_region())?;
    packet[CIPHERTEXT_SIZE..].copy_from_slice(&encrypted_mac);

    Ok(MessagePacket::from_bytes(packet))
}

/// Verify then decrypt a packet with its pad. A MAC mismatch yields
/// `valid: false` and nothing from the message body.
pub fn decrypt_message(packet: &MessagePacket, pad: &OneTimePad) -> Result<DecryptedMessage> {
    let mac = xor_bytes(packet.encrypted_mac(), pad.mac_region())?;
    let expected = message_mac(pad, packet.ciphertext());
    if !constant_time_compare(&mac, &expected) {
        tracing::warn!(pad = pad.number(), "message failed MAC verification");
        return Ok(DecryptedMessage::rejected());
    }

    let mut parts = Zeroizing::new(xor_bytes(
        pad.message_region(),
        &packet.ciphertext()[PAD_IDENTIFIER_SIZE..],
    )?);
    if pad.reverses_message() {
        reverse_bits(&mut parts[..]);
    }

    let mut ts = [0u8; 8];
    ts[8 - MESSAGE_TIMESTAMP_SIZE..].copy_from_slice(&parts[TIMESTAMP_OFFSET..]);
    let timestamp = u64::from_be_bytes(ts);

    // An out of range length returns the whole block rather than a guess
    let length = parts[LENGTH_OFFSET] as usize;
    let end = if length <= MESSAGE_SIZE { length } else { MESSAGE_SIZE };

    Ok(DecryptedMessage {
        plaintext: String::from_utf8_lossy(&parts[..end]).into_owned(),
        timestamp,
        valid: true,
    })
}
