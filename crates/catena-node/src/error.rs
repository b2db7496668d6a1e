//! The node's share of the error taxonomy (§7): wraps the ledger and
//! transaction failures an orchestrator step can surface, plus gossip
//! transport failures bubbling up from a peer.

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Ledger(#[from] catena_ledger::LedgerError),

    #[error(transparent)]
    Tx(#[from] catena_tx::TxError),

    #[error(transparent)]
    Gossip(#[from] catena_gossip::GossipError),

    #[error("no known peer with uuid {0}")]
    UnknownPeer(uuid::Uuid),
}

pub type NodeResult<T> = Result<T, NodeError>;
