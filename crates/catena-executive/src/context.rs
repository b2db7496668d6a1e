use std::collections::HashMap;

use catena_db::Database;
use catena_sql::Expr;
use catena_types::Hash;

/// The fields of the block currently being applied that the built-in
/// `$block*` variables resolve to (§6). A thin, executive-owned mirror of
/// `catena-ledger`'s `Block` rather than a dependency on it: `catena-ledger`
/// depends on this crate, never the other way around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u64,
    pub signature: Hash,
    pub previous: Hash,
    pub miner: Hash,
    pub timestamp: u64,
}

/// Everything one statement's authorization and execution needs (§4.4): the
/// backend connection, the logical database it runs against, the invoker's
/// identity hash, the enclosing block's metadata, and any parameter values
/// inherited from the caller (always empty at the top level of a
/// transaction, §4.6 step 7 — carried through so a future caller that does
/// have pre-bound values has somewhere to put them).
pub struct ExecutionContext<'a> {
    pub db: &'a dyn Database,
    pub database: String,
    pub invoker: Hash,
    pub block: BlockInfo,
    pub parameter_values: HashMap<String, Expr>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(db: &'a dyn Database, database: impl Into<String>, invoker: Hash, block: BlockInfo) -> Self {
        Self {
            db,
            database: database.into(),
            invoker,
            block,
            parameter_values: HashMap::new(),
        }
    }

    /// Built-in `$name` bindings resolvable without touching the backend
    /// (§6): `$invoker`, `$blockHeight`, `$blockSignature`,
    /// `$previousBlockSignature`, `$blockMiner`, `$blockTimestamp`. Keys are
    /// lowercase because the lexer case-folds variable names at parse time.
    /// `$invoker` resolves to the SHA-256 invoker hash rather than the raw
    /// public key, matching the identity representation grants, `databases`
    /// ownership, and `$blockMiner` already use everywhere else (§3, §4.3).
    pub fn builtin_variables(&self) -> HashMap<String, Expr> {
        let mut vars = HashMap::new();
        vars.insert(
            "invoker".to_string(),
            Expr::LiteralBlob(self.invoker.as_bytes().to_vec()),
        );
        vars.insert(
            "blockheight".to_string(),
            Expr::LiteralInt(self.block.height as i64),
        );
        vars.insert(
            "blocksignature".to_string(),
            Expr::LiteralBlob(self.block.signature.as_bytes().to_vec()),
        );
        vars.insert(
            "previousblocksignature".to_string(),
            Expr::LiteralBlob(self.block.previous.as_bytes().to_vec()),
        );
        vars.insert(
            "blockminer".to_string(),
            Expr::LiteralBlob(self.block.miner.as_bytes().to_vec()),
        );
        vars.insert(
            "blocktimestamp".to_string(),
            Expr::LiteralInt(self.block.timestamp as i64),
        );
        vars
    }
}
