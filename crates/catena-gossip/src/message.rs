//! The gossip wire protocol (§6): a bidirectional framed exchange over
//! whatever transport [`crate::PeerLink`] abstracts over. This crate only
//! defines the JSON shape — the literal WebSocket plumbing is out of scope
//! (§1 "TCP/WebSocket wire plumbing").

use catena_ledger::Block;
use catena_tx::TransactionWire;
use catena_types::Hash;
use serde::{Deserialize, Serialize};

/// `[seq, {"t": type, ...}]` (§6). The initiator uses even `seq` starting at
/// 0; the acceptor uses odd `seq` starting at 1; responses carry the
/// request's `seq` — tracked by [`crate::peer::Peer`], not encoded here.
pub type Frame = (u64, Message);

/// The six message types from §6, internally tagged on `"t"` so the wire
/// shape is exactly `{"t": "fetch", "hash": "..."}` rather than a nested
/// `{"Fetch": {...}}`.
///
/// `Tx` carries a single [`TransactionWire`] rather than the literal
/// `tx{tx:{...},signature}` shape — `TransactionWire` already has its own
/// `signature` field, so splitting it out as a sibling would just duplicate
/// the same bytes under two names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Message {
    Query,
    Fetch { hash: Hash },
    Block { block: Block },
    Tx { tx: TransactionWire },
    Index {
        highest: Hash,
        height: u64,
        genesis: Hash,
        peers: Vec<String>,
    },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_frame_round_trips_as_a_two_element_array() {
        let frame: Frame = (0, Message::Query);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"[0,{"t":"query"}]"#);
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(back.0, 0);
        assert!(matches!(back.1, Message::Query));
    }

    #[test]
    fn fetch_frame_carries_the_requested_hash() {
        let hash = Hash::from([9u8; 32]);
        let frame: Frame = (2, Message::Fetch { hash });
        let json = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&json).unwrap();
        match back.1 {
            Message::Fetch { hash: got } => assert_eq!(got, hash),
            other => panic!("expected Fetch, got {other:?}"),
        }
    }

    #[test]
    fn index_frame_carries_peer_addresses() {
        let frame: Frame = (
            1,
            Message::Index {
                highest: Hash::ZERO,
                height: 0,
                genesis: Hash::ZERO,
                peers: vec!["ws://10.0.0.2:8338".to_string()],
            },
        );
        let json = serde_json::to_string(&frame).unwrap();
        let back: Frame = serde_json::from_str(&json).unwrap();
        match back.1 {
            Message::Index { peers, .. } => assert_eq!(peers, vec!["ws://10.0.0.2:8338".to_string()]),
            other => panic!("expected Index, got {other:?}"),
        }
    }
}
