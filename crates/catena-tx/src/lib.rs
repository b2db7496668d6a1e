//! The signed SQL transaction (§3 "Transaction"): an invoker's public key,
//! the database it targets, a per-invoker replay counter, a parsed
//! statement, and the Ed25519 signature over the canonical serialization of
//! those four fields.

mod error;
mod transaction;
mod wire;

pub use error::{TxError, TxResult};
pub use transaction::{canonical_signing_bytes, Transaction};
pub use wire::TransactionWire;
