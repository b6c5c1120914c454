//! Relay protocol: the encrypted, length-obfuscated envelope that carries
//! message packets between group members and the relay server.
//!
//! A request payload is
//! `paddingLength(2) || padding || packets || timestamp(5) || fromUser(1) || action(1)`,
//! encrypted with a Skein-512 counter keystream and sent as
//! `base64(nonce || ciphertext || mac)`. The response reverses the layout so
//! its fixed fields can be read from the end.

pub mod codes;
pub mod keys;
pub mod keystream;
pub mod packet;
pub mod poller;
pub mod relay;
pub mod request;
pub mod response;
pub mod transport;

pub use codes::*;
pub use keys::*;
pub use keystream::*;
pub use packet::*;
pub use poller::*;
pub use relay::*;
pub use request::*;
pub use response::*;
pub use transport::*;

use crate::error::{JerichoError, Result};
use crate::pad::MESSAGE_PACKET_SIZE;
use crate::primitives::DIGEST_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Random per-packet nonce, both directions
pub const NONCE_SIZE: usize = 64;

pub const NETWORK_MAC_SIZE: usize = DIGEST_SIZE;

pub const PADDING_LENGTH_SIZE: usize = 2;
pub const TIMESTAMP_SIZE: usize = 5;
pub const FROM_USER_SIZE: usize = 1;
pub const ACTION_SIZE: usize = 1;

/// Request padding lies between one and three message packets
pub const REQUEST_PADDING_MIN: usize = MESSAGE_PACKET_SIZE;
pub const REQUEST_PADDING_MAX: usize = MESSAGE_PACKET_SIZE * 3;

pub const MAX_MESSAGES_PER_REQUEST: usize = 3;

/// One more than a message packet so an empty response never matches the
/// size of a response carrying a single message
pub const RESPONSE_PADDING_MIN: usize = MESSAGE_PACKET_SIZE + 1;
pub const RESPONSE_PADDING_MAX: usize = RESPONSE_PADDING_MIN * 3;

pub const NUM_MESSAGES_SIZE: usize = 2;
pub const RESPONSE_CODE_SIZE: usize = 1;

/// Smallest response on the wire before base64
pub const RESPONSE_MIN_SIZE: usize =
    NONCE_SIZE + RESPONSE_PADDING_MIN + NUM_MESSAGES_SIZE + RESPONSE_CODE_SIZE + NETWORK_MAC_SIZE;

/// Relay acceptance window around its own clock, in seconds
pub const TIMESTAMP_WINDOW: u64 = 300;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(21);

pub const BASE_POLL_INTERVAL: Duration = Duration::from_secs(3);

const _: () = assert!(RESPONSE_MIN_SIZE == 324);

/// What the relay is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiAction {
    Send,
    #[default]
    Receive,
    Test,
}

impl ApiAction {
    pub fn as_byte(self) -> u8 {
        match self {
            ApiAction::Send => b's',
            ApiAction::Receive => b'r',
            ApiAction::Test => b't',
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b's' => Some(ApiAction::Send),
            b'r' => Some(ApiAction::Receive),
            b't' => Some(ApiAction::Test),
            _ => None,
        }
    }
}

impl std::str::FromStr for ApiAction {
    type Err = JerichoError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "send" | "s" => Ok(Self::Send),
            "receive" | "r" => Ok(Self::Receive),
            "test" | "t" => Ok(Self::Test),
            _ => Err(JerichoError::UnsupportedAlgorithm(format!("api action: {}", s))),
        }
    }
}
