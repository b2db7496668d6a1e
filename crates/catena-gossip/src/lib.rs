//! Gossip wire messages, handshake validation, and the per-peer state
//! machine (§4.10, §6). Transport (WebSocket framing, TCP listeners, local
//! peer discovery) is deliberately out of this crate's scope — it only
//! defines the [`PeerLink`] seam that `catena-node` implements.

mod error;
mod message;
mod peer;

pub use error::{GossipError, GossipResult};
pub use message::{Frame, Message};
pub use peer::{validate_handshake, Peer, PeerLink, PeerState, PROTOCOL_VERSION};
