//! The node orchestrator (§4.11): hosts the ledger, the miner (which
//! exclusively owns the mempool), the peer table, and this node's own UUID.
//! Its scheduler [`Node::tick`] runs once every [`TICK_INTERVAL`] and
//! performs exactly the single step §4.11 describes; [`Node::handle_message`]
//! is the other half, dispatching inbound gossip frames (§4.10, §6).

mod error;
mod mempool;
mod miner;
mod peer_table;

pub use error::{NodeError, NodeResult};
pub use mempool::Mempool;
pub use miner::Miner;
pub use peer_table::{Candidate, PeerHandle, PeerTable};

use catena_gossip::{Message, PeerState};
use catena_ledger::{Block, Ledger, LedgerEvent, PermanentStore, ReceiveOutcome, ReplayQueue};
use catena_tx::Transaction;
use catena_types::Hash;
use uuid::Uuid;

/// §4.11 "The timer fires every 2 seconds."
pub const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

/// Everything the node orchestrator owns (§3 "Ownership": "the node
/// orchestrator owns peer records; each peer owns at most one live
/// connection"). Constructed once per process (§9 "Global state": "the
/// process maintains exactly one node").
pub struct Node {
    pub uuid: Uuid,
    pub ledger: Ledger,
    pub replay_queue: ReplayQueue,
    pub miner: Miner,
    pub peers: PeerTable,
}

impl Node {
    pub fn new(uuid: Uuid, miner: Miner, permanent: PermanentStore) -> Self {
        Node {
            uuid,
            ledger: Ledger::new(),
            replay_queue: ReplayQueue::new(permanent),
            miner,
            peers: PeerTable::new(),
        }
    }

    async fn drain_events(&self, events: Vec<LedgerEvent>) -> NodeResult<()> {
        for event in events {
            self.replay_queue.handle_event(event, &self.ledger).await?;
        }
        Ok(())
    }

    /// Runs `block` through fork choice (§4.8) and the replay queue (§4.9),
    /// whether it arrived from a peer's `block` gossip frame or from this
    /// node's own miner.
    pub async fn receive_block(&self, block: Block) -> NodeResult<ReceiveOutcome> {
        let (outcome, events) = self.ledger.receive(block).await?;
        self.drain_events(events).await?;
        Ok(outcome)
    }

    /// §4.10 closing paragraph: "after `mined(block)`, broadcast a `block`
    /// gossip to every peer currently in `queried` or `connected` state,
    /// best-effort" — a send failure is logged and otherwise ignored; it
    /// never aborts the broadcast to the remaining peers.
    pub async fn broadcast_mined(&self, block: &Block) {
        for handle in self.peers.all().await {
            if !matches!(handle.peer.state().await, PeerState::Queried | PeerState::Connected) {
                continue;
            }
            if let Err(error) = handle.send(Message::Block { block: block.clone() }).await {
                tracing::warn!(%error, peer = %handle.peer.uuid, "best-effort mined-block broadcast failed");
            }
        }
    }

    /// §4.11: one step of the scheduler tick — pop one candidate and
    /// dispatch its fetch, then advance one peer in the query queue
    /// (refilling it from the full peer set first if it's empty).
    pub async fn tick(&self) {
        if let Some(candidate) = self.peers.pop_candidate().await {
            if let Some(handle) = self.peers.get(candidate.peer).await {
                if let Err(error) = handle.send(Message::Fetch { hash: candidate.hash }).await {
                    tracing::warn!(%error, peer = %candidate.peer, "candidate fetch dispatch failed");
                    handle.peer.transition(PeerState::Failed(error.to_string())).await;
                }
            }
        }

        if let Some(uuid) = self.peers.next_query_peer().await {
            if let Some(handle) = self.peers.get(uuid).await {
                handle.peer.transition(PeerState::Querying).await;
                if let Err(error) = handle.send(Message::Query).await {
                    tracing::warn!(%error, peer = %uuid, "query dispatch failed");
                    handle.peer.transition(PeerState::Failed(error.to_string())).await;
                }
            }
        }
    }

    /// Dispatches one inbound gossip frame (§4.10, §6). `from` identifies
    /// the peer the frame arrived on; the reply (if any) is sent back over
    /// that same peer's connection.
    pub async fn handle_message(&self, from: Uuid, message: Message) -> NodeResult<()> {
        match message {
            Message::Query => self.handle_query(from).await,
            Message::Fetch { hash } => self.handle_fetch(from, hash).await,
            Message::Block { block } => self.handle_block(from, block).await,
            Message::Tx { tx } => self.handle_tx(tx).await,
            Message::Index { highest, height, .. } => self.handle_index(from, highest, height).await,
            Message::Error { message } => {
                tracing::warn!(peer = %from, %message, "peer reported an error");
                Ok(())
            }
        }
    }

    async fn handle_query(&self, from: Uuid) -> NodeResult<()> {
        let Some(handle) = self.peers.get(from).await else {
            return Ok(());
        };
        let highest = self.ledger.longest_head().await;
        let index = Message::Index {
            highest: highest.as_ref().map(|b| b.signature).unwrap_or(Hash::ZERO),
            height: self.ledger.longest_height().await.unwrap_or(0),
            genesis: self.ledger.genesis_hash().await.unwrap_or(Hash::ZERO),
            // Peer address exchange rides on this same frame (§6), but the
            // address book itself lives with whatever owns the node
            // database (the CLI binary, §6 "Persisted state") rather than
            // in this transport-agnostic table.
            peers: Vec::new(),
        };
        handle.send(index).await?;
        Ok(())
    }

    async fn handle_fetch(&self, from: Uuid, hash: Hash) -> NodeResult<()> {
        let Some(handle) = self.peers.get(from).await else {
            return Ok(());
        };
        match self.ledger.get(hash).await {
            Some(block) => handle.send(Message::Block { block }).await?,
            None => {
                handle
                    .send(Message::Error { message: format!("unknown block {hash}") })
                    .await?
            }
        }
        Ok(())
    }

    /// §4.10: validates and inserts the block (`Ledger::receive` rejects a
    /// bad proof-of-work or signature on its own); if it turns out to be an
    /// orphan, enqueues its missing predecessor as a fresh candidate against
    /// the same peer so the gap gets chased down automatically.
    async fn handle_block(&self, from: Uuid, block: Block) -> NodeResult<()> {
        let height = block.index.saturating_sub(1);
        let outcome = self.receive_block(block).await?;
        if let ReceiveOutcome::Orphaned { missing_previous } = outcome {
            self.peers
                .enqueue_candidate(Candidate { hash: missing_previous, height, peer: from })
                .await;
        }
        Ok(())
    }

    async fn handle_tx(&self, tx: catena_tx::TransactionWire) -> NodeResult<()> {
        let transaction = Transaction::try_from(tx)?;
        self.miner.mempool().append(transaction).await?;
        Ok(())
    }

    /// §4.10: "compare `height` to local `longest.highest.index`; if
    /// greater, enqueue a candidate."
    async fn handle_index(&self, from: Uuid, highest: Hash, height: u64) -> NodeResult<()> {
        let local_height = self.ledger.longest_height().await;
        if local_height.map_or(true, |local| height > local) {
            self.peers.enqueue_candidate(Candidate { hash: highest, height, peer: from }).await;
        }
        Ok(())
    }
}
