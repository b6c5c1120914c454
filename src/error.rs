use crate::network::ResponseCode;
use crate::user::Callsign;
use thiserror::Error;

/// Programming-invariant violations. These indicate a bug or a broken
/// environment, never attacker input, and callers should abort rather than
/// continue with possibly wrong ciphertext.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("XOR operands differ in length ({left} and {right} bytes)")]
    XorLengthMismatch { left: usize, right: usize },

    #[error("Failsafe RNG used before a key was loaded")]
    RngNotInitialised,

    #[error("Operating system RNG failed: {0}")]
    EntropySource(String),

    #[error("Invalid request state transition: {0}")]
    InvalidStateTransition(String),
}

#[derive(Error, Debug)]
pub enum JerichoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invalid pad: {0}")]
    InvalidPad(String),

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("MAC verification failed for {0}")]
    MacVerificationFailed(String),

    #[error("Pad index integrity check failed for {0}")]
    IndexIntegrityFailed(Callsign),

    #[error("No pads remaining to send messages as {0}")]
    NoPadsAvailable(Callsign),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{}", .0.status_message())]
    Response(ResponseCode),

    #[error("Fatal: {0}")]
    Fatal(#[from] FatalError),
}

impl JerichoError {
    /// True for invariant violations that must not be caught and retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, JerichoError::Fatal(_))
    }

    /// True for evidence of tampering with pads, keys, or the pad index.
    pub fn is_tamper(&self) -> bool {
        matches!(
            self,
            JerichoError::MacVerificationFailed(_) | JerichoError::IndexIntegrityFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, JerichoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let fatal: JerichoError = FatalError::XorLengthMismatch { left: 3, right: 4 }.into();
        assert!(fatal.is_fatal());
        assert!(!fatal.is_tamper());

        let tamper = JerichoError::IndexIntegrityFailed(Callsign::Alpha);
        assert!(tamper.is_tamper());
        assert!(!tamper.is_fatal());

        assert!(!JerichoError::NoPadsAvailable(Callsign::Bravo).is_fatal());
    }

    #[test]
    fn test_response_error_uses_status_message() {
        let err = JerichoError::Response(ResponseCode::InvalidMac);
        assert!(err.to_string().contains("MAC validation failed"));
    }
}
