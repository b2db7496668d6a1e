use std::fmt;
use std::str::FromStr;

use catena_types::Hash;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::digest::sha256;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("malformed key material: {0}")]
    Malformed(#[from] ed25519_dalek::SignatureError),
}

/// An Ed25519 public key. Displayed and serialized as lowercase hex, as used
/// by the query endpoint's username field and the gossip wire format.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(CryptoError::WrongLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        // Validate it's a well-formed compressed Edwards point.
        VerifyingKey::from_bytes(&out)?;
        Ok(PublicKey(out))
    }

    /// SHA-256 over the raw public key bytes: the invoker hash used for
    /// grants lookups and the `users`/`databases` metadata tables.
    pub fn invoker_hash(&self) -> Hash {
        sha256(&self.0)
    }

    fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        Ok(VerifyingKey::from_bytes(&self.0)?)
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = self.verifying_key() else {
            return false;
        };
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 64 {
            return Err(CryptoError::WrongLength {
                expected: 64,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; 64];
        out.copy_from_slice(&bytes);
        Ok(Signature(out))
    }

    /// Signatures are used as a deterministic ordering tie-break within a
    /// block (§4.6 step 5) — plain lexicographic comparison of the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl PartialOrd for Signature {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Signature {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

/// An Ed25519 identity capable of signing. Holds both halves of the keypair;
/// `private_key_hex`/`from_private_key_hex` round-trip through the hex
/// encoding the query endpoint's password field and the node config's
/// `privateKey` entry use (§6).
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    pub fn from_private_key_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(CryptoError::WrongLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self {
            signing_key: SigningKey::from_bytes(&out),
        })
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

/// Encodes bytes as base58, matching the display form several teacher crates
/// reach for (`bs58`) alongside hex for user-facing identifiers.
pub fn base58_encode(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

pub fn base58_decode(s: &str) -> Result<Vec<u8>, bs58::decode::Error> {
    bs58::decode(s).into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello");
        assert!(kp.public_key().verify(b"hello", &sig));
        assert!(!kp.public_key().verify(b"goodbye", &sig));
    }

    #[test]
    fn private_key_hex_round_trips_to_same_identity() {
        let kp = KeyPair::generate();
        let hex_key = kp.private_key_hex();
        let restored = KeyPair::from_private_key_hex(&hex_key).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn invoker_hash_is_sha256_of_pubkey_bytes() {
        let kp = KeyPair::generate();
        let pk = kp.public_key();
        assert_eq!(pk.invoker_hash(), sha256(&pk.0));
    }

    #[test]
    fn signature_ordering_is_lexicographic_on_bytes() {
        let a = Signature([0u8; 64]);
        let mut b_bytes = [0u8; 64];
        b_bytes[63] = 1;
        let b = Signature(b_bytes);
        assert!(a < b);
    }

    #[test]
    fn base58_round_trips() {
        let bytes = vec![1, 2, 3, 250, 255];
        let encoded = base58_encode(&bytes);
        assert_eq!(base58_decode(&encoded).unwrap(), bytes);
    }
}
