use catena_types::Hash;
use sha2::{Digest, Sha256};

/// SHA-256 over arbitrary bytes, used for miner/invoker identity hashes,
/// the blocks archive key, and SQL template hashing.
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    Hash::try_from(digest.as_slice()).expect("SHA-256 digest is always 32 bytes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        // SHA-256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        assert_eq!(
            sha256(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(sha256(b"catena"), sha256(b"catena"));
        assert_ne!(sha256(b"catena"), sha256(b"Catena"));
    }
}
