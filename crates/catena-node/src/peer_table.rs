//! The peer table (§4.11, §5): the peer map, the candidate queue, and the
//! query queue live behind one mutex, since a single scheduler tick touches
//! more than one of them in the same step ("the node mutex guards the peer
//! map, the candidate queue, and the query queue. All peer-state transitions
//! acquire it," §5).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use catena_gossip::{Frame, GossipResult, Message, Peer, PeerLink, PeerState};
use catena_types::Hash;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A pending block hash advertised by a peer that the local ledger hasn't
/// fetched yet (GLOSSARY "Candidate").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub hash: Hash,
    pub height: u64,
    pub peer: Uuid,
}

/// A peer's state-machine bookkeeping paired with its one live connection
/// (§3 "Ownership": "each peer owns at most one live connection"). The
/// connection itself is a transport-agnostic [`PeerLink`] — `catena-node`
/// never opens a socket; whatever constructs a `PeerHandle` (the CLI binary,
/// or a test) supplies the link.
pub struct PeerHandle {
    pub peer: Peer,
    link: Arc<dyn PeerLink>,
}

impl PeerHandle {
    pub fn new(peer: Peer, link: Arc<dyn PeerLink>) -> Self {
        PeerHandle { peer, link }
    }

    /// Sends `message` as the next frame in this peer's outbound sequence
    /// (§6 "Initiator uses even `seq`...; responses carry the request's
    /// `seq`" — request/response correlation for replies is the caller's
    /// job, since only the caller knows whether this send is a fresh request
    /// or a reply to one).
    pub async fn send(&self, message: Message) -> GossipResult<()> {
        let seq = self.peer.next_seq().await;
        self.link.send((seq, message)).await
    }

    /// Sends `message` and waits up to `timeout` for the next inbound frame
    /// (§4.10 "each outstanding request has a deadline; on expiry,
    /// transition peer to `failed`"). Intended for request/response
    /// exchanges (e.g. `query` → `index`, `fetch` → `block`); broadcast
    /// sends (`tx`, unsolicited `block`) should use [`PeerHandle::send`]
    /// instead since they expect no reply.
    pub async fn request(&self, message: Message, timeout: std::time::Duration) -> GossipResult<Frame> {
        self.send(message).await?;
        match tokio::time::timeout(timeout, self.link.recv()).await {
            Ok(result) => {
                if result.is_err() {
                    self.peer.transition(PeerState::Failed(catena_gossip::GossipError::ConnectionClosed.to_string())).await;
                }
                result
            }
            Err(_) => {
                self.peer.transition(PeerState::Failed("request timed out".to_string())).await;
                Err(catena_gossip::GossipError::Timeout)
            }
        }
    }
}

struct PeerTableInner {
    peers: HashMap<Uuid, Arc<PeerHandle>>,
    candidates: VecDeque<Candidate>,
    query_queue: VecDeque<Uuid>,
}

/// §5: the single node mutex, covering exactly the three pieces of state it
/// names. Lock order is node → peer, never the reverse — enforced here by
/// only ever returning an `Arc<PeerHandle>` and locking the peer's own
/// mutex (inside [`Peer`]) after this table's lock has been released.
pub struct PeerTable {
    inner: Mutex<PeerTableInner>,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerTable {
    pub fn new() -> Self {
        PeerTable {
            inner: Mutex::new(PeerTableInner {
                peers: HashMap::new(),
                candidates: VecDeque::new(),
                query_queue: VecDeque::new(),
            }),
        }
    }

    pub async fn insert(&self, handle: Arc<PeerHandle>) {
        let mut inner = self.inner.lock().await;
        inner.peers.insert(handle.peer.uuid, handle);
    }

    /// Drops a peer and scrubs it from the query queue, e.g. once its
    /// connection closes.
    pub async fn remove(&self, uuid: Uuid) {
        let mut inner = self.inner.lock().await;
        inner.peers.remove(&uuid);
        inner.query_queue.retain(|u| *u != uuid);
    }

    pub async fn get(&self, uuid: Uuid) -> Option<Arc<PeerHandle>> {
        self.inner.lock().await.peers.get(&uuid).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<PeerHandle>> {
        self.inner.lock().await.peers.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.peers.len()
    }

    /// §4.10 "compare `height` to local `longest.highest.index`; if
    /// greater, enqueue a candidate" — deduplicates by hash so a hash
    /// advertised by several peers (or re-advertised on a later `index`)
    /// only gets fetched once.
    pub async fn enqueue_candidate(&self, candidate: Candidate) {
        let mut inner = self.inner.lock().await;
        if !inner.candidates.iter().any(|c| c.hash == candidate.hash) {
            inner.candidates.push_back(candidate);
        }
    }

    pub async fn candidate_count(&self) -> usize {
        self.inner.lock().await.candidates.len()
    }

    /// §4.11 "pop the candidate queue (if any) and dispatch a fetch."
    pub(crate) async fn pop_candidate(&self) -> Option<Candidate> {
        self.inner.lock().await.candidates.pop_front()
    }

    /// §4.11 "advance the first peer in the query queue; if the query queue
    /// is empty, refill it with all peers."
    pub(crate) async fn next_query_peer(&self) -> Option<Uuid> {
        let mut inner = self.inner.lock().await;
        if inner.query_queue.is_empty() {
            inner.query_queue = inner.peers.keys().copied().collect();
        }
        inner.query_queue.pop_front()
    }
}
