//! The mempool (§5 "owned by the miner and guarded by its own mutex;
//! `append` is the only mutation point"), modeled on the
//! `TxPool`/`BlockSealer` split in the teacher's sealer — generalized from
//! "seal on tx-count/timer" to "mine with proof-of-work, abort-on-better-
//! block" but keeping the same pool/sealer separation of concerns.

use catena_ledger::MAX_TRANSACTIONS_PER_BLOCK;
use catena_tx::Transaction;
use tokio::sync::Mutex;

use crate::error::NodeResult;

#[derive(Default)]
pub struct Mempool {
    pending: Mutex<Vec<Transaction>>,
}

impl Mempool {
    pub fn new() -> Self {
        Mempool::default()
    }

    /// The mempool's only mutation point (§5). Re-verifies the signature —
    /// transactions reach here either from the query endpoint (already
    /// signed with a live identity) or from a `tx` gossip frame (an
    /// unauthenticated peer), so this boundary never trusts a caller's word
    /// for it.
    pub async fn append(&self, tx: Transaction) -> NodeResult<()> {
        tx.verify()?;
        self.pending.lock().await.push(tx);
        Ok(())
    }

    /// Removes and returns up to [`MAX_TRANSACTIONS_PER_BLOCK`] transactions
    /// in arrival order, for the miner to build its next block from.
    pub async fn drain_for_block(&self) -> Vec<Transaction> {
        let mut pending = self.pending.lock().await;
        let take = pending.len().min(MAX_TRANSACTIONS_PER_BLOCK);
        pending.drain(..take).collect()
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_crypto::KeyPair;
    use catena_sql::parse_statement;

    fn tx(counter: u64) -> Transaction {
        let kp = KeyPair::generate();
        Transaction::sign(&kp, "db", counter, parse_statement("SELECT 1").unwrap()).unwrap()
    }

    #[tokio::test]
    async fn append_rejects_a_tampered_transaction() {
        let pool = Mempool::new();
        let mut t = tx(0);
        t.counter = 5;
        assert!(pool.append(t).await.is_err());
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn drain_removes_up_to_the_block_limit_in_order() {
        let pool = Mempool::new();
        let a = tx(0);
        let b = tx(1);
        pool.append(a.clone()).await.unwrap();
        pool.append(b.clone()).await.unwrap();
        let drained = pool.drain_for_block().await;
        assert_eq!(drained, vec![a, b]);
        assert!(pool.is_empty().await);
    }
}
