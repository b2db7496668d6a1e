//! The wire form of a [`Transaction`] (§6 gossip `tx{tx:{...},signature}`
//! message, and the JSON-array block payload from §3). `PublicKey`,
//! `Signature`, and `Statement` already serialize as hex/structured JSON on
//! their own, so this is a plain field-for-field mirror rather than a
//! hand-rolled encoding.

use catena_crypto::{PublicKey, Signature};
use catena_sql::Statement;
use serde::{Deserialize, Serialize};

use crate::error::TxResult;
use crate::transaction::Transaction;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionWire {
    pub invoker: PublicKey,
    pub database: String,
    pub counter: u64,
    pub statement: Statement,
    pub signature: Signature,
}

impl From<&Transaction> for TransactionWire {
    fn from(tx: &Transaction) -> Self {
        Self {
            invoker: tx.invoker,
            database: tx.database.clone(),
            counter: tx.counter,
            statement: tx.statement.clone(),
            signature: tx.signature,
        }
    }
}

impl TryFrom<TransactionWire> for Transaction {
    type Error = crate::error::TxError;

    /// Reconstructs and validates (§3 invariants: signature verifies,
    /// statement parses, database name shape) a transaction received over
    /// the wire.
    fn try_from(wire: TransactionWire) -> TxResult<Self> {
        Transaction::from_parts(
            wire.invoker,
            wire.database,
            wire.counter,
            wire.statement,
            wire.signature,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_crypto::KeyPair;
    use catena_sql::parse_statement;

    #[test]
    fn round_trips_through_json() {
        let kp = KeyPair::generate();
        let tx = Transaction::sign(
            &kp,
            "mydb",
            0,
            parse_statement("INSERT INTO t (x) VALUES (1)").unwrap(),
        )
        .unwrap();
        let wire = TransactionWire::from(&tx);
        let json = serde_json::to_string(&wire).unwrap();
        let back: TransactionWire = serde_json::from_str(&json).unwrap();
        let restored = Transaction::try_from(back).unwrap();
        assert_eq!(restored, tx);
    }
}
