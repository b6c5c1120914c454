use crate::error::{JerichoError, Result};
use crate::pad::codec::{decrypt_message, DecryptedMessage};
use crate::pad::{MessagePacket, OneTimePad};

/// Verify and decrypt a hex packet with a hex pad.
///
/// A packet made with a different pad, or one whose MAC fails, is an error
/// rather than an empty message.
pub fn decrypt_with_pad(packet_hex: &str, pad_hex: &str) -> Result<DecryptedMessage> {
    let packet = MessagePacket::from_hex(packet_hex.trim())?;
    let pad = OneTimePad::from_hex(0, pad_hex.trim())?;
    if packet.identifier() != pad.identifier() {
        return Err(JerichoError::InvalidPad(format!(
            "packet belongs to pad {}, not {}",
            packet.identifier(),
            pad.identifier()
        )));
    }

    let message = decrypt_message(&packet, &pad)?;
    if !message.valid {
        return Err(JerichoError::MacVerificationFailed("message".into()));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::encrypt::{encrypt_with_pad, EncryptOptions};
    use crate::pad::PAD_SIZE;

    fn pad_hex(byte: u8) -> String {
        hex::encode([byte; PAD_SIZE])
    }

    fn packet(text: &str) -> String {
        let options = EncryptOptions {
            pad_hex: pad_hex(0x17),
            timestamp: Some(1_500_000_000),
        };
        encrypt_with_pad(text, &options).unwrap()
    }

    #[test]
    fn test_decrypt_roundtrip() {
        let message = decrypt_with_pad(&packet("meet at noon"), &pad_hex(0x17)).unwrap();
        assert_eq!(message.plaintext, "meet at noon");
        assert_eq!(message.timestamp, 1_500_000_000);
    }

    #[test]
    fn test_wrong_pad_and_tamper() {
        assert!(matches!(
            decrypt_with_pad(&packet("x"), &pad_hex(0x18)),
            Err(JerichoError::InvalidPad(_))
        ));

        let mut bytes = hex::decode(packet("x")).unwrap();
        bytes[40] ^= 0x01;
        let err = decrypt_with_pad(&hex::encode(bytes), &pad_hex(0x17)).unwrap_err();
        assert!(err.is_tamper());
    }
}
