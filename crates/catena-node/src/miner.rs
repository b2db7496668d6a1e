//! The miner (§3 "Ownership": "the miner exclusively owns the in-progress
//! candidate block and the mempool"; §4.11, §5). Builds a candidate block
//! from the current chain head and the mempool's contents, then mines it on
//! a blocking task so the CPU-bound proof-of-work loop never stalls the
//! async runtime (§5 "Suspension/blocking points").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use catena_crypto::KeyPair;
use catena_ledger::{Block, Ledger};
use catena_types::Hash;

use crate::mempool::Mempool;

fn current_unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Owns the mempool exclusively (§3) and the abort flag that cancels an
/// in-progress mining attempt (§5 "Cancellation": "mining is interrupted by
/// setting an abort flag read inside the nonce loop").
pub struct Miner {
    key_pair: KeyPair,
    mempool: Arc<Mempool>,
    abort: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(key_pair: KeyPair, mempool: Arc<Mempool>) -> Self {
        Miner {
            key_pair,
            mempool,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mempool(&self) -> &Arc<Mempool> {
        &self.mempool
    }

    pub fn miner_hash(&self) -> Hash {
        self.key_pair.public_key().invoker_hash()
    }

    /// Signals an in-progress [`Miner::mine_next`] call to give up at its
    /// next abort check — used when a better block arrives from a peer
    /// while mining is underway, so the node doesn't waste cycles extending
    /// a head that's already stale.
    pub fn abort_current(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Builds a candidate from the ledger's current head plus up to
    /// [`catena_ledger::MAX_TRANSACTIONS_PER_BLOCK`] mempool transactions,
    /// and mines it to completion (or until aborted). Returns `None` if
    /// mining was aborted before a valid nonce was found; the caller is
    /// expected to retry with a fresh head/mempool snapshot.
    pub async fn mine_next(&self, ledger: &Ledger, difficulty: u32) -> Option<Block> {
        let head = ledger.longest_head().await;
        let (index, previous) = match &head {
            Some(head) => (head.index + 1, head.signature),
            None => (0, Hash::ZERO),
        };
        let transactions = self.mempool.drain_for_block().await;
        let timestamp = current_unix_time();
        let mut block = Block::unsigned(index, previous, self.miner_hash(), timestamp, transactions);

        self.abort.store(false, Ordering::Relaxed);
        let abort = self.abort.clone();
        let (block, solved) = tokio::task::spawn_blocking(move || {
            let solved = block.mine(difficulty, &abort);
            (block, solved)
        })
        .await
        .unwrap_or((block_stub(index, previous, timestamp), false));

        solved.then_some(block)
    }
}

/// A placeholder used only if the blocking task itself panics or is
/// cancelled before returning its block — mining simply failed to produce
/// one, so the caller retries on the next tick.
fn block_stub(index: u64, previous: Hash, timestamp: u64) -> Block {
    Block::unsigned(index, previous, Hash::ZERO, timestamp, vec![])
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_ledger::INITIAL_DIFFICULTY;
    use std::sync::atomic::AtomicBool as StdAtomicBool;

    #[tokio::test]
    async fn mines_a_genesis_successor_extending_the_ledger_head() {
        let ledger = Ledger::new();
        let mut genesis = Block::genesis_unsigned("seed", Hash::from([1u8; 32]), 0);
        genesis.mine(1, &StdAtomicBool::new(false));
        ledger.receive(genesis.clone()).await.unwrap();

        let miner = Miner::new(KeyPair::generate(), Arc::new(Mempool::new()));
        let block = miner.mine_next(&ledger, 1).await.unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.previous, genesis.signature);
        assert!(block.verify_proof_of_work(1));
    }

    #[tokio::test]
    async fn mines_the_genesis_block_when_the_ledger_is_empty() {
        let ledger = Ledger::new();
        let miner = Miner::new(KeyPair::generate(), Arc::new(Mempool::new()));
        let block = miner.mine_next(&ledger, 1).await.unwrap();
        assert_eq!(block.index, 0);
        assert_eq!(block.previous, Hash::ZERO);
    }

    #[tokio::test]
    async fn aborting_an_in_progress_attempt_yields_no_block() {
        let ledger = Ledger::new();
        let miner = Arc::new(Miner::new(KeyPair::generate(), Arc::new(Mempool::new())));
        let mining = {
            let miner = miner.clone();
            tokio::spawn(async move { miner.mine_next(&ledger, 250).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        miner.abort_current();
        assert!(mining.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn drains_mempool_transactions_into_the_candidate() {
        let ledger = Ledger::new();
        let mut genesis = Block::genesis_unsigned("seed", Hash::from([1u8; 32]), 0);
        genesis.mine(1, &StdAtomicBool::new(false));
        ledger.receive(genesis.clone()).await.unwrap();

        let mempool = Arc::new(Mempool::new());
        let kp = KeyPair::generate();
        let tx = catena_tx::Transaction::sign(&kp, "db", 0, catena_sql::parse_statement("SELECT 1").unwrap()).unwrap();
        mempool.append(tx.clone()).await.unwrap();

        let miner = Miner::new(KeyPair::generate(), mempool);
        let block = miner.mine_next(&ledger, 1).await.unwrap();
        assert_eq!(block.payload.transaction_count(), 1);
    }
}
