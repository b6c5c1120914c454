//! Skein-512 counter-mode stream cipher for the network envelope.

use crate::error::Result;
use crate::primitives::{skein512, xor_bytes, DIGEST_SIZE};

/// Counter block for keystream block `index`.
///
/// Deployed relays render the decimal index zero-padded to 16 digits and
/// parse that string as hex, so block 10 uses bytes `00..00 10`. Indexes
/// stay far below 10^16 for any payload the protocol carries.
pub fn keystream_counter(index: u64) -> [u8; 8] {
    let mut counter = [0u8; 8];
    let mut rest = index;
    for byte in counter.iter_mut().rev() {
        let low = (rest % 10) as u8;
        rest /= 10;
        let high = (rest % 10) as u8;
        rest /= 10;
        *byte = (high << 4) | low;
    }
    counter
}

/// `Skein512(key || nonce || counter_0) || Skein512(key || nonce || counter_1) || ...`
/// truncated to `length` bytes
pub fn hash_keystream(key: &[u8], nonce: &[u8], length: usize) -> Vec<u8> {
    let blocks = length.div_ceil(DIGEST_SIZE);
    let mut stream = Vec::with_capacity(blocks * DIGEST_SIZE);
    for index in 0..blocks as u64 {
        stream.extend_from_slice(&skein512(&[key, nonce, &keystream_counter(index)]));
    }
    stream.truncate(length);
    stream
}

/// XOR `payload` with the keystream; encryption and decryption are the same
pub fn encrypt_payload(key: &[u8], nonce: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    xor_bytes(&hash_keystream(key, nonce, payload.len()), payload)
}
