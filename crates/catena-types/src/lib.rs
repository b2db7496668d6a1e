//! Shared primitive types used across the Catena workspace.
//!
//! Kept dependency-light (`serde`, `thiserror`, `hex` only) so that every
//! other crate — SQL, crypto, ledger, gossip — can depend on it without
//! pulling in async or database machinery.

mod hash;
mod ordered_map;

pub use hash::{Hash, HashParseError};
pub use ordered_map::OrderedMap;
