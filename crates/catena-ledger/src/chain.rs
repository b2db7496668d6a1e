//! A single candidate chain: an ordered run of blocks from genesis to its
//! current head (§3, §4.8). The ledger holds several of these at once while
//! forks are unresolved.

use catena_types::Hash;

use crate::block::Block;

/// `blocks[0]` is always the genesis block; `blocks[i].index == i as u64`.
/// Forking clones the shared prefix into a new `Chain` rather than sharing
/// storage — acceptable here since a chain is bounded by how far a fork can
/// reach back, and keeps [`Ledger`](crate::ledger::Ledger)'s bookkeeping free
/// of reference-counting.
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    pub fn new(genesis: Block) -> Self {
        Chain { blocks: vec![genesis] }
    }

    pub fn genesis_hash(&self) -> Hash {
        self.blocks[0].signature
    }

    pub fn head(&self) -> &Block {
        self.blocks.last().expect("a chain always has at least its genesis block")
    }

    /// The head block's index, i.e. the chain's height (§4.8 "strictly by
    /// block height").
    pub fn height(&self) -> u64 {
        self.head().index
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn contains_hash(&self, hash: &Hash) -> bool {
        self.blocks.iter().any(|b| &b.signature == hash)
    }

    fn index_of(&self, hash: &Hash) -> Option<usize> {
        self.blocks.iter().position(|b| &b.signature == hash)
    }

    /// Appends `block` to a copy of this chain. Callers are expected to have
    /// already checked `block.previous == self.head().signature`.
    pub fn extended_with(&self, block: Block) -> Chain {
        let mut blocks = self.blocks.clone();
        blocks.push(block);
        Chain { blocks }
    }

    /// Builds a new chain sharing this chain's prefix up to and including
    /// `previous_hash`, with `block` appended — the "branch mid-chain"
    /// outcome of §4.8 step 3. Returns `None` if `previous_hash` isn't
    /// actually a block on this chain.
    pub fn branched_at(&self, previous_hash: &Hash, block: Block) -> Option<Chain> {
        let idx = self.index_of(previous_hash)?;
        let mut blocks = self.blocks[..=idx].to_vec();
        blocks.push(block);
        Some(Chain { blocks })
    }
}

/// The highest index at which `a` and `b` agree on the block signature,
/// scanning from genesis forward — the common ancestor used to compute
/// `didUnwind`/`didAppend` spans (§4.8).
pub fn common_ancestor_index(a: &Chain, b: &Chain) -> Option<usize> {
    let limit = a.blocks.len().min(b.blocks.len());
    let mut found = None;
    for i in 0..limit {
        if a.blocks[i].signature == b.blocks[i].signature {
            found = Some(i);
        } else {
            break;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn mined(index: u64, previous: Hash) -> Block {
        let mut block = Block::unsigned(index, previous, Hash::from([3u8; 32]), index, vec![]);
        block.mine(1, &AtomicBool::new(false));
        block
    }

    #[test]
    fn extended_with_appends_and_preserves_prefix() {
        let genesis = mined(0, Hash::ZERO);
        let genesis_sig = genesis.signature;
        let chain = Chain::new(genesis);
        let next = mined(1, genesis_sig);
        let extended = chain.extended_with(next.clone());
        assert_eq!(extended.height(), 1);
        assert_eq!(extended.head().signature, next.signature);
        assert_eq!(extended.blocks()[0].signature, genesis_sig);
    }

    #[test]
    fn branched_at_truncates_to_the_fork_point() {
        let genesis = mined(0, Hash::ZERO);
        let genesis_sig = genesis.signature;
        let chain = Chain::new(genesis);
        let b1 = mined(1, genesis_sig);
        let chain = chain.extended_with(b1.clone());
        let b2a = mined(2, b1.signature);
        let chain = chain.extended_with(b2a);

        let b2b = mined(2, b1.signature);
        let forked = chain.branched_at(&b1.signature, b2b.clone()).unwrap();
        assert_eq!(forked.height(), 2);
        assert_eq!(forked.head().signature, b2b.signature);
        assert_eq!(forked.blocks().len(), 3);
    }

    #[test]
    fn common_ancestor_finds_the_shared_prefix() {
        let genesis = mined(0, Hash::ZERO);
        let genesis_sig = genesis.signature;
        let base = Chain::new(genesis);
        let b1 = mined(1, genesis_sig);
        let base = base.extended_with(b1.clone());

        let a = base.extended_with(mined(2, b1.signature));
        let b = base.extended_with(mined(2, b1.signature));

        let idx = common_ancestor_index(&a, &b).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(a.blocks()[idx].signature, b1.signature);
    }
}
