//! The ledger's share of the error taxonomy (§7): block-shape rejections,
//! proof-of-work/signature failures, and metadata corruption. Per-transaction
//! authorization/dispatch failures are `catena_executive::ExecutiveError` and
//! are deliberately *not* folded in here — the payload applier (§4.6 step 7)
//! catches them at the per-transaction savepoint and isolates them; they
//! never propagate as a block-level `LedgerError`.

use catena_db::DbError;
use catena_tx::TxError;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("block does not extend a known head")]
    Inconsecutive,

    #[error("block proof-of-work is invalid")]
    SignatureError,

    #[error("a transaction signature in the block payload is invalid")]
    PayloadSignatureError,

    #[error("block carries {0} transactions, exceeding the limit of 100")]
    TooManyTransactions(usize),

    #[error("payload-for-signing is {0} bytes, exceeding the 1 MiB limit")]
    PayloadTooLarge(usize),

    #[error("metadata head pointer is missing or corrupt")]
    MetadataError,

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Tx(#[from] TxError),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
