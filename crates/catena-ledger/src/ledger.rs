//! The chain set, orphan pool, and fork-choice pointer (§3, §4.8), guarded by
//! a single `tokio::sync::Mutex` per §5's "the ledger mutex guards the chain
//! set, orphan pool, and `longest` pointer" — modeled on the single-mutex
//! ownership style `ioi-foundation`'s `orchestration/gossip.rs` uses for its
//! chain reference (`context.chain_ref.lock().await`).

use std::collections::{HashMap, VecDeque};

use catena_types::Hash;
use tokio::sync::Mutex;

use crate::block::{Block, INITIAL_DIFFICULTY};
use crate::chain::{common_ancestor_index, Chain};
use crate::error::{LedgerError, LedgerResult};

/// The outcome of `receive(block)` (§4.8 steps 2-4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The block was already known (as a chain block or a pending orphan).
    Duplicate,
    /// Extended an existing chain's head.
    Extended,
    /// Created a new chain branching off an existing one mid-chain.
    Branched,
    /// `previous` isn't known anywhere yet; the caller should ask peers for it.
    Orphaned { missing_previous: Hash },
}

/// Emitted when fork choice moves the `longest` pointer (§4.8's closing
/// paragraph). A chain switch emits at most one `Unwind` followed by zero or
/// more `Append`s, in that order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    Unwind { from: Hash, to: Hash },
    Append { block: Block },
}

enum InsertAttempt {
    Extended(Hash),
    Branched(Hash),
    NoMatch,
}

#[derive(Default)]
struct LedgerInner {
    chains: HashMap<Hash, Chain>,
    orphans_by_hash: HashMap<Hash, Block>,
    orphans_by_previous: HashMap<Hash, Vec<Hash>>,
    longest: Option<Hash>,
}

impl LedgerInner {
    fn contains_anywhere(&self, hash: &Hash) -> bool {
        self.chains.values().any(|c| c.contains_hash(hash)) || self.orphans_by_hash.contains_key(hash)
    }

    fn attempt_insert(&mut self, block: Block) -> InsertAttempt {
        if self.chains.contains_key(&block.previous) {
            let chain = self.chains.remove(&block.previous).expect("just checked contains_key");
            let new_head = block.signature;
            self.chains.insert(new_head, chain.extended_with(block));
            return InsertAttempt::Extended(new_head);
        }
        let branch_source = self.chains.values().find(|c| c.contains_hash(&block.previous)).cloned();
        if let Some(chain) = branch_source {
            let new_head = block.signature;
            if let Some(new_chain) = chain.branched_at(&block.previous, block) {
                self.chains.insert(new_head, new_chain);
                return InsertAttempt::Branched(new_head);
            }
        }
        InsertAttempt::NoMatch
    }

    /// Re-runs fork choice (§4.8 "strictly by block height; ties keep the
    /// incumbent") and emits the unwind/append events implied by any switch.
    fn reevaluate_longest(&mut self, old_longest: Option<&Chain>, events: &mut Vec<LedgerEvent>) {
        let Some(best) = self.chains.values().max_by_key(|c| c.height()).cloned() else {
            return;
        };
        let switches = match old_longest {
            None => true,
            Some(old) => best.height() > old.height(),
        };
        if !switches {
            return;
        }
        self.longest = Some(best.head().signature);
        match old_longest {
            None => {
                for block in best.blocks() {
                    events.push(LedgerEvent::Append { block: block.clone() });
                }
            }
            Some(old) => {
                let ancestor_idx = common_ancestor_index(old, &best);
                let ancestor_hash = ancestor_idx.map(|i| old.blocks()[i].signature);
                if let Some(ancestor_hash) = ancestor_hash {
                    if ancestor_hash != old.head().signature {
                        events.push(LedgerEvent::Unwind {
                            from: old.head().signature,
                            to: ancestor_hash,
                        });
                    }
                }
                let start = ancestor_idx.map(|i| i + 1).unwrap_or(0);
                for block in &best.blocks()[start..] {
                    events.push(LedgerEvent::Append { block: block.clone() });
                }
            }
        }
    }

    /// Drains the orphan pool reachable from `new_head` (§4.8 step 5): any
    /// orphan whose `previous` is now known gets re-processed, breadth-first
    /// so a chain of several orphans resolves in one `receive` call.
    fn drain_orphans(&mut self, new_head: Hash, events: &mut Vec<LedgerEvent>) {
        let mut queue = VecDeque::from([new_head]);
        while let Some(hash) = queue.pop_front() {
            let Some(waiting) = self.orphans_by_previous.remove(&hash) else {
                continue;
            };
            for orphan_hash in waiting {
                let Some(orphan_block) = self.orphans_by_hash.remove(&orphan_hash) else {
                    continue;
                };
                let old_longest = self.longest.and_then(|h| self.chains.get(&h)).cloned();
                match self.attempt_insert(orphan_block) {
                    InsertAttempt::Extended(head) | InsertAttempt::Branched(head) => {
                        self.reevaluate_longest(old_longest.as_ref(), events);
                        queue.push_back(head);
                    }
                    InsertAttempt::NoMatch => {
                        // Shouldn't happen (we only drain orphans whose
                        // previous we just learned), but if it does, put it
                        // back rather than lose it.
                        self.orphans_by_previous.entry(hash).or_default().push(orphan_hash);
                        self.orphans_by_hash.insert(orphan_hash, orphan_block);
                    }
                }
            }
        }
    }

    fn receive_validated(&mut self, block: Block, events: &mut Vec<LedgerEvent>) -> ReceiveOutcome {
        if self.contains_anywhere(&block.signature) {
            return ReceiveOutcome::Duplicate;
        }

        if block.index == 0 && block.previous.is_zero() && self.chains.is_empty() {
            let head = block.signature;
            self.chains.insert(head, Chain::new(block));
            self.reevaluate_longest(None, events);
            self.drain_orphans(head, events);
            return ReceiveOutcome::Extended;
        }

        let old_longest = self.longest.and_then(|h| self.chains.get(&h)).cloned();
        match self.attempt_insert(block.clone()) {
            InsertAttempt::Extended(new_head) => {
                self.reevaluate_longest(old_longest.as_ref(), events);
                self.drain_orphans(new_head, events);
                ReceiveOutcome::Extended
            }
            InsertAttempt::Branched(new_head) => {
                self.reevaluate_longest(old_longest.as_ref(), events);
                self.drain_orphans(new_head, events);
                ReceiveOutcome::Branched
            }
            InsertAttempt::NoMatch => {
                let missing = block.previous;
                self.orphans_by_previous.entry(missing).or_default().push(block.signature);
                self.orphans_by_hash.insert(block.signature, block);
                ReceiveOutcome::Orphaned { missing_previous: missing }
            }
        }
    }
}

fn validate_block(block: &Block) -> LedgerResult<()> {
    block.validate_limits()?;
    if !block.verify_proof_of_work(INITIAL_DIFFICULTY) {
        return Err(LedgerError::SignatureError);
    }
    if let crate::block::BlockPayload::Transactions(txs) = &block.payload {
        for tx in txs {
            tx.verify().map_err(|_| LedgerError::PayloadSignatureError)?;
        }
    }
    Ok(())
}

/// The ledger (§3, §4.8): owns every known chain, the orphan pool, and the
/// fork-choice pointer, all behind one mutex.
pub struct Ledger {
    inner: Mutex<LedgerInner>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Ledger { inner: Mutex::new(LedgerInner::default()) }
    }

    /// §4.8 `receive(block)`: validates signature/payload, then runs the
    /// extend/branch/orphan/drain algorithm, returning both the immediate
    /// outcome and any fork-choice events it triggered.
    pub async fn receive(&self, block: Block) -> LedgerResult<(ReceiveOutcome, Vec<LedgerEvent>)> {
        validate_block(&block)?;
        let mut inner = self.inner.lock().await;
        let mut events = Vec::new();
        let outcome = inner.receive_validated(block, &mut events);
        Ok((outcome, events))
    }

    pub async fn longest_head(&self) -> Option<Block> {
        let inner = self.inner.lock().await;
        let head = inner.longest?;
        inner.chains.get(&head).map(|c| c.head().clone())
    }

    pub async fn longest_height(&self) -> Option<u64> {
        let inner = self.inner.lock().await;
        let head = inner.longest?;
        inner.chains.get(&head).map(|c| c.height())
    }

    pub async fn genesis_hash(&self) -> Option<Hash> {
        let inner = self.inner.lock().await;
        let head = inner.longest?;
        inner.chains.get(&head).map(|c| c.genesis_hash())
    }

    pub async fn orphan_count(&self) -> usize {
        self.inner.lock().await.orphans_by_hash.len()
    }

    /// The index of the block carrying `hash`, wherever it lives among the
    /// currently known chains — used by the replay queue to translate a
    /// `didUnwind` target hash into an index it can compare against the
    /// permanent store's head (§4.9).
    pub async fn block_index_of(&self, hash: Hash) -> Option<u64> {
        let inner = self.inner.lock().await;
        inner.chains.values().find_map(|c| c.blocks().iter().find(|b| b.signature == hash).map(|b| b.index))
    }

    /// Looks up a block by hash wherever it lives: on a known chain, or
    /// still sitting in the orphan pool (§4.8 "get(block)" alongside
    /// `receive(block)` in the operations the ledger mutex must guard) —
    /// used to answer a peer's `fetch` request.
    pub async fn get(&self, hash: Hash) -> Option<Block> {
        let inner = self.inner.lock().await;
        for chain in inner.chains.values() {
            if let Some(block) = chain.blocks().iter().find(|b| b.signature == hash) {
                return Some(block.clone());
            }
        }
        inner.orphans_by_hash.get(&hash).cloned()
    }

    /// The full run of blocks from genesis up to and including `hash`,
    /// wherever it lives among the currently known chains — used for the
    /// replay queue's "walk the new-longest chain from genesis to `to`"
    /// full-reapply path (§4.9).
    pub async fn path_to(&self, hash: Hash) -> Option<Vec<Block>> {
        let inner = self.inner.lock().await;
        for chain in inner.chains.values() {
            if let Some(idx) = chain.blocks().iter().position(|b| b.signature == hash) {
                return Some(chain.blocks()[..=idx].to_vec());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn mined(index: u64, previous: Hash, salt: u8) -> Block {
        let mut block = Block::unsigned(index, previous, Hash::from([salt; 32]), index, vec![]);
        block.mine(1, &AtomicBool::new(false));
        block
    }

    #[tokio::test]
    async fn genesis_bootstraps_the_longest_chain_and_emits_append() {
        let ledger = Ledger::new();
        let genesis = mined(0, Hash::ZERO, 1);
        let (outcome, events) = ledger.receive(genesis.clone()).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Extended);
        assert_eq!(events, vec![LedgerEvent::Append { block: genesis.clone() }]);
        assert_eq!(ledger.longest_height().await, Some(0));
    }

    #[tokio::test]
    async fn linear_extension_advances_the_head_without_unwind() {
        let ledger = Ledger::new();
        let genesis = mined(0, Hash::ZERO, 1);
        ledger.receive(genesis.clone()).await.unwrap();
        let b1 = mined(1, genesis.signature, 2);
        let (outcome, events) = ledger.receive(b1.clone()).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Extended);
        assert_eq!(events, vec![LedgerEvent::Append { block: b1.clone() }]);
        assert_eq!(ledger.longest_height().await, Some(1));
    }

    #[tokio::test]
    async fn a_taller_fork_triggers_unwind_then_append() {
        let ledger = Ledger::new();
        let genesis = mined(0, Hash::ZERO, 1);
        ledger.receive(genesis.clone()).await.unwrap();
        let a1 = mined(1, genesis.signature, 2);
        ledger.receive(a1.clone()).await.unwrap();

        let b1 = mined(1, genesis.signature, 3);
        let (outcome, events) = ledger.receive(b1.clone()).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Branched);
        assert!(events.is_empty(), "a tying fork must not switch longest");
        assert_eq!(ledger.longest_height().await, Some(1));

        let b2 = mined(2, b1.signature, 4);
        let (outcome, events) = ledger.receive(b2.clone()).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Extended);
        assert_eq!(
            events,
            vec![
                LedgerEvent::Unwind { from: a1.signature, to: genesis.signature },
                LedgerEvent::Append { block: b1.clone() },
                LedgerEvent::Append { block: b2.clone() },
            ]
        );
        assert_eq!(ledger.longest_height().await, Some(2));
    }

    #[tokio::test]
    async fn an_orphan_is_queued_and_then_drains_once_its_parent_arrives() {
        let ledger = Ledger::new();
        let genesis = mined(0, Hash::ZERO, 1);
        let b1 = mined(1, genesis.signature, 2);
        let b2 = mined(2, b1.signature, 3);

        let (outcome, events) = ledger.receive(b2.clone()).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Orphaned { missing_previous: b1.signature });
        assert!(events.is_empty());
        assert_eq!(ledger.orphan_count().await, 1);

        ledger.receive(genesis.clone()).await.unwrap();
        let (outcome, events) = ledger.receive(b1.clone()).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Extended);
        // Draining b2 behind b1 advances the head twice in one call.
        assert_eq!(
            events,
            vec![
                LedgerEvent::Append { block: b1.clone() },
                LedgerEvent::Append { block: b2.clone() },
            ]
        );
        assert_eq!(ledger.longest_height().await, Some(2));
        assert_eq!(ledger.orphan_count().await, 0);
    }

    #[tokio::test]
    async fn get_finds_blocks_on_known_chains_and_in_the_orphan_pool() {
        let ledger = Ledger::new();
        let genesis = mined(0, Hash::ZERO, 1);
        ledger.receive(genesis.clone()).await.unwrap();
        assert_eq!(ledger.get(genesis.signature).await, Some(genesis.clone()));

        let b2 = mined(2, Hash::from([9u8; 32]), 5);
        ledger.receive(b2.clone()).await.unwrap();
        assert_eq!(ledger.get(b2.signature).await, Some(b2));
        assert_eq!(ledger.get(Hash::from([42u8; 32])).await, None);
    }

    #[tokio::test]
    async fn duplicate_block_is_a_no_op() {
        let ledger = Ledger::new();
        let genesis = mined(0, Hash::ZERO, 1);
        ledger.receive(genesis.clone()).await.unwrap();
        let (outcome, events) = ledger.receive(genesis).await.unwrap();
        assert_eq!(outcome, ReceiveOutcome::Duplicate);
        assert!(events.is_empty());
    }
}
