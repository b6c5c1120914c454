use crate::cascade::keys::MacKeys;
use crate::primitives::{constant_time_compare, keccak512, skein512, xor_arrays, Digest512};

/// `Keccak512(keccakKey || data) XOR Skein512(skeinKey || data)`
pub fn cascade_mac(keys: &MacKeys, data: &[u8]) -> Digest512 {
    let keccak = keccak512(&[&keys.keccak, data]);
    let skein = skein512(&[&keys.skein, data]);
    xor_arrays(&keccak, &skein)
}

/// Recompute and compare in constant time
pub fn verify_cascade_mac(keys: &MacKeys, data: &[u8], expected: &[u8]) -> bool {
    let computed = cascade_mac(keys, data);
    constant_time_compare(&computed, expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> MacKeys {
        MacKeys {
            keccak: [0xaa; 64],
            skein: [0xbb; 64],
        }
    }

    #[test]
    fn test_deterministic() {
        let a = cascade_mac(&keys(), b"index data");
        let b = cascade_mac(&keys(), b"index data");
        assert_eq!(a, b);
    }

    #[test]
    fn test_construction() {
        let k = keys();
        let expected = xor_arrays(
            &keccak512(&[&k.keccak, b"abc"]),
            &skein512(&[&k.skein, b"abc"]),
        );
        assert_eq!(cascade_mac(&k, b"abc"), expected);
    }

    #[test]
    fn test_key_and_data_sensitivity() {
        let base = cascade_mac(&keys(), b"payload");
        assert_ne!(base, cascade_mac(&keys(), b"payloae"));

        let mut other = keys();
        other.skein[0] ^= 1;
        assert_ne!(base, cascade_mac(&other, b"payload"));
    }

    #[test]
    fn test_verify() {
        let mac = cascade_mac(&keys(), b"data");
        assert!(verify_cascade_mac(&keys(), b"data", &mac));
        assert!(!verify_cascade_mac(&keys(), b"data", &mac[..63]));

        let mut bad = mac;
        bad[10] ^= 0x80;
        assert!(!verify_cascade_mac(&keys(), b"data", &bad));
    }
}
