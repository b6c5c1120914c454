use super::{NETWORK_MAC_SIZE, NONCE_SIZE};
use crate::error::{JerichoError, Result};
use crate::primitives::Digest512;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// `nonce || ciphertext || mac` as carried in a request or response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPacket {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
    pub mac: Digest512,
}

impl NetworkPacket {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len() + NETWORK_MAC_SIZE);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.mac);
        out
    }

    /// Split raw bytes by the fixed nonce and MAC lengths
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NONCE_SIZE + NETWORK_MAC_SIZE {
            return Err(JerichoError::InvalidPacket(format!(
                "network packet of {} bytes is shorter than nonce and MAC",
                bytes.len()
            )));
        }

        let (nonce, rest) = bytes.split_at(NONCE_SIZE);
        let (ciphertext, mac) = rest.split_at(rest.len() - NETWORK_MAC_SIZE);

        let mut packet = NetworkPacket {
            nonce: [0u8; NONCE_SIZE],
            ciphertext: ciphertext.to_vec(),
            mac: [0u8; NETWORK_MAC_SIZE],
        };
        packet.nonce.copy_from_slice(nonce);
        packet.mac.copy_from_slice(mac);
        Ok(packet)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(body: &str) -> Result<Self> {
        Self::from_bytes(&STANDARD.decode(body.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let packet = NetworkPacket {
            nonce: [1; NONCE_SIZE],
            ciphertext: vec![2; 10],
            mac: [3; NETWORK_MAC_SIZE],
        };
        let bytes = packet.to_bytes();
        assert_eq!(bytes.len(), NONCE_SIZE + 10 + NETWORK_MAC_SIZE);
        assert_eq!(bytes[NONCE_SIZE], 2);
        assert_eq!(bytes[NONCE_SIZE + 10], 3);
        assert_eq!(NetworkPacket::from_base64(&packet.to_base64()).unwrap(), packet);
    }

    #[test]
    fn test_rejects_short_and_bad_base64() {
        assert!(NetworkPacket::from_bytes(&[0; 127]).is_err());
        let empty_body = NetworkPacket::from_bytes(&[0; 128]).unwrap();
        assert!(empty_body.ciphertext.is_empty());
        assert!(matches!(
            NetworkPacket::from_base64("not base64!"),
            Err(JerichoError::Base64(_))
        ));
    }
}
