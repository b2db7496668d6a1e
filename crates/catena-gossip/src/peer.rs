//! The per-peer state machine (§4.10) and the transport seam it runs over.
//! Each [`Peer`] owns its own mutex guarding its state and outbound sequence
//! counter; lock order is node → peer, never the reverse (§5) — enforced at
//! the type level by `Peer` never holding a reference back to a peer table.

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::GossipResult;
use crate::message::Frame;

/// §4.10 "Handshake (initiator side) includes `X-UUID`, `X-Port`,
/// `X-Version`." Bumping this is a protocol break; peers that report a
/// different value are rejected outright.
pub const PROTOCOL_VERSION: u32 = 1;

/// A transport-agnostic send/receive seam (§1's "external collaborators with
/// named contracts," §9 "the core depends only on a small capability").
/// `catena-node`'s binary is where a real `tokio-tungstenite` WebSocket
/// implementation would plug in; this crate never opens a socket itself.
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn send(&self, frame: Frame) -> GossipResult<()>;
    async fn recv(&self) -> GossipResult<Frame>;
}

/// §4.10: `new -> connecting -> connected -> querying -> queried`, with
/// terminal `failed(reason)`/`ignored(reason)` branches reachable from any
/// non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Querying,
    Queried,
    Failed(String),
    Ignored(String),
}

impl PeerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerState::Failed(_) | PeerState::Ignored(_))
    }
}

/// Validates an inbound handshake (§4.10 "Reject if UUID equals own, version
/// mismatches, port ∉ (0, 65536)").
pub fn validate_handshake(own_uuid: Uuid, peer_uuid: Uuid, peer_version: u32, peer_port: u32) -> GossipResult<()> {
    use crate::error::GossipError;
    if peer_uuid == own_uuid {
        return Err(GossipError::SelfConnection);
    }
    if peer_version != PROTOCOL_VERSION {
        return Err(GossipError::VersionMismatch(peer_version));
    }
    if peer_port == 0 || peer_port >= 65536 {
        return Err(GossipError::InvalidPort(peer_port));
    }
    Ok(())
}

/// One gossip peer's identity, state, and outbound sequence counter (§4.10,
/// §6 "Initiator uses even `seq` starting at 0; acceptor uses odd `seq`
/// starting at 1").
pub struct Peer {
    pub uuid: Uuid,
    /// Set for peers that initiated the inbound connection rather than being
    /// dialed — they own the odd-`seq` half of the frame numbering.
    pub passive: bool,
    state: Mutex<PeerState>,
    next_seq: Mutex<u64>,
}

impl Peer {
    pub fn new(uuid: Uuid, passive: bool) -> Self {
        Peer {
            uuid,
            passive,
            state: Mutex::new(PeerState::New),
            next_seq: Mutex::new(if passive { 1 } else { 0 }),
        }
    }

    pub async fn state(&self) -> PeerState {
        self.state.lock().await.clone()
    }

    pub async fn transition(&self, next: PeerState) {
        *self.state.lock().await = next;
    }

    /// The next outbound frame sequence number, advancing by 2 to keep the
    /// initiator/acceptor parities from ever colliding (§6).
    pub async fn next_seq(&self) -> u64 {
        let mut seq = self.next_seq.lock().await;
        let current = *seq;
        *seq += 2;
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_handshake_matching_our_own_uuid() {
        let uuid = Uuid::new_v4();
        let err = validate_handshake(uuid, uuid, PROTOCOL_VERSION, 8338).unwrap_err();
        assert!(matches!(err, crate::error::GossipError::SelfConnection));
    }

    #[test]
    fn rejects_a_version_mismatch() {
        let err = validate_handshake(Uuid::new_v4(), Uuid::new_v4(), PROTOCOL_VERSION + 1, 8338).unwrap_err();
        assert!(matches!(err, crate::error::GossipError::VersionMismatch(_)));
    }

    #[test]
    fn rejects_an_out_of_range_port() {
        let err = validate_handshake(Uuid::new_v4(), Uuid::new_v4(), PROTOCOL_VERSION, 0).unwrap_err();
        assert!(matches!(err, crate::error::GossipError::InvalidPort(0)));
        let err = validate_handshake(Uuid::new_v4(), Uuid::new_v4(), PROTOCOL_VERSION, 65536).unwrap_err();
        assert!(matches!(err, crate::error::GossipError::InvalidPort(65536)));
    }

    #[test]
    fn accepts_a_well_formed_handshake() {
        validate_handshake(Uuid::new_v4(), Uuid::new_v4(), PROTOCOL_VERSION, 8338).unwrap();
    }

    #[tokio::test]
    async fn initiator_and_acceptor_sequence_numbers_never_collide() {
        let initiator = Peer::new(Uuid::new_v4(), false);
        let acceptor = Peer::new(Uuid::new_v4(), true);
        let initiator_seqs: Vec<u64> = {
            let mut v = Vec::new();
            for _ in 0..3 {
                v.push(initiator.next_seq().await);
            }
            v
        };
        let acceptor_seqs: Vec<u64> = {
            let mut v = Vec::new();
            for _ in 0..3 {
                v.push(acceptor.next_seq().await);
            }
            v
        };
        assert_eq!(initiator_seqs, vec![0, 2, 4]);
        assert_eq!(acceptor_seqs, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn state_transitions_reach_a_terminal_state() {
        let peer = Peer::new(Uuid::new_v4(), false);
        assert_eq!(peer.state().await, PeerState::New);
        peer.transition(PeerState::Connecting).await;
        peer.transition(PeerState::Connected).await;
        peer.transition(PeerState::Querying).await;
        peer.transition(PeerState::Queried).await;
        assert_eq!(peer.state().await, PeerState::Queried);
        peer.transition(PeerState::Failed("timed out".to_string())).await;
        assert!(peer.state().await.is_terminal());
    }
}
