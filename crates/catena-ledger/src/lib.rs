//! Blocks, proof-of-work, the canonical payload-application reducer, the
//! fork-choice ledger, and the bounded replay queue (§3, §4.6-§4.9).

mod block;
mod chain;
mod error;
mod ledger;
mod metadata;
mod payload;
mod replay_queue;

pub use block::{Block, BlockPayload, INITIAL_DIFFICULTY, MAX_PAYLOAD_BYTES, MAX_TRANSACTIONS_PER_BLOCK};
pub use chain::Chain;
pub use error::{LedgerError, LedgerResult};
pub use ledger::{Ledger, LedgerEvent, ReceiveOutcome};
pub use payload::apply_block;
pub use replay_queue::{PermanentStore, ReplayQueue, MAX_QUEUE_SIZE};
