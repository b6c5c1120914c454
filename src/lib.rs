//! Jericho - One-time pad messaging engine
//!
//! Messages are encrypted and authenticated with single-use pads shared by a
//! group ahead of time, then carried through a semi-trusted relay inside a
//! padded, encrypted envelope that hides their size and sender.
//!
//! ## Layers
//!
//! ```text
//! Session → PadCodec → NetworkProtocol → Transport
//!    ↓
//! PadStore → CascadeCrypto (at rest)
//! ```
//!
//! - **PadCodec**: per-message OTP encryption and a pad-keyed MAC
//! - **PadStore**: pad inventory with a MAC over each user's pad index
//! - **CascadeCrypto**: AES-CTR ⊕ Salsa20 encryption, Keccak ⊕ Skein MACs, cascaded PBKDF
//! - **NetworkProtocol**: Skein-512 counter-mode envelope with random padding
//!
//! ## Example
//!
//! ```no_run
//! use jericho::cli::{encrypt_with_pad, decrypt_with_pad, EncryptOptions};
//!
//! let pad_hex = "ab".repeat(192);
//! let options = EncryptOptions {
//!     pad_hex: pad_hex.clone(),
//!     ..Default::default()
//! };
//! let packet = encrypt_with_pad("hello", &options).unwrap();
//! let message = decrypt_with_pad(&packet, &pad_hex).unwrap();
//! assert_eq!(message.plaintext, "hello");
//! ```

pub mod cascade;
pub mod cli;
pub mod config;
pub mod database;
pub mod decoy;
pub mod error;
pub mod network;
pub mod pad;
pub mod primitives;
pub mod rng;
pub mod session;
pub mod user;

pub use config::ClientConfig;
pub use database::{FileStore, PadDatabase, UnlockOptions, UnlockedDatabase};
pub use error::{FatalError, JerichoError, Result};
pub use network::{MemoryRelay, ResponseCode, Transport};
pub use pad::store::{PadPersistence, PadStore};
pub use pad::{MessagePacket, OneTimePad, PadIdentifier};
pub use rng::FailsafeRng;
pub use session::{PollOutcome, ReceivedMessage, SentMessage, Session};
pub use user::Callsign;
