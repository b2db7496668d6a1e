//! Ed25519 identities and the SHA-256/hex/base58 helpers used throughout
//! Catena for block hashing, transaction signing, and invoker identification.

mod digest;
mod keys;

pub use digest::sha256;
pub use keys::{base58_decode, base58_encode, CryptoError, KeyPair, PublicKey, Signature};
