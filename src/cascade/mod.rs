//! Cascade constructions over two independent primitive families.
//!
//! Encryption XORs an AES-256-CTR keystream with a Salsa20 keystream, MACs
//! XOR a Keccak-512 digest with a Skein-512 digest, and the password KDF
//! chains PBKDF2-Keccak into a Skein repetition KDF. Breaking any of them
//! requires breaking both families.

pub mod at_rest;
pub mod cipher;
pub mod kdf;
pub mod keys;
pub mod mac;

pub use at_rest::*;
pub use cipher::*;
pub use kdf::*;
pub use keys::*;
pub use mac::*;
