use crate::error::{JerichoError, Result};
use crate::pad::codec::encrypt_message;
use crate::pad::{current_timestamp, OneTimePad, MESSAGE_SIZE};
use crate::rng::FailsafeRng;

/// Options for the encrypt command
#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    /// Pad as 384 hex symbols
    pub pad_hex: String,
    /// Defaults to the current time
    pub timestamp: Option<u64>,
}

/// Encrypt one message with a hex pad and return the packet as hex
pub fn encrypt_with_pad(message: &str, options: &EncryptOptions) -> Result<String> {
    if message.is_empty() || message.len() > MESSAGE_SIZE {
        return Err(JerichoError::InvalidPacket(format!(
            "message must be 1 to {} bytes, got {}",
            MESSAGE_SIZE,
            message.len()
        )));
    }
    let pad = OneTimePad::from_hex(0, options.pad_hex.trim())?;
    let timestamp = options.timestamp.unwrap_or_else(current_timestamp);

    let mut rng = FailsafeRng::temporary();
    let packet = encrypt_message(message, &pad, timestamp, &mut rng)?;
    Ok(packet.to_hex())
}
