//! Hash computation for VAA digests
//!
//! Guardians sign the double keccak256 of the VAA body; the single hash is the
//! digest reported back to admin callers.

use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Digest that guardian signatures are produced over: keccak256(keccak256(body))
pub fn signing_digest(body: &[u8]) -> [u8; 32] {
    keccak256(&keccak256(body))
}

/// Convert bytes32 to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        assert_eq!(
            hex::encode(keccak256(&[])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_signing_digest_is_double_hash() {
        let body = b"body";
        assert_eq!(signing_digest(body), keccak256(&keccak256(body)));
        assert_ne!(signing_digest(body), keccak256(body));
    }

    #[test]
    fn test_bytes32_to_hex() {
        assert_eq!(bytes32_to_hex(&[0u8; 32]), format!("0x{}", "0".repeat(64)));
    }
}
