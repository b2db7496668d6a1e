//! The gossip layer's error taxonomy (§7): handshake rejections and the
//! transport-level failures a [`crate::PeerLink`] implementation reports
//! back up through the peer state machine.

#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    #[error("handshake UUID matches our own")]
    SelfConnection,

    #[error("protocol version mismatch: peer reports {0}")]
    VersionMismatch(u32),

    #[error("invalid gossip port {0}")]
    InvalidPort(u32),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timed out")]
    Timeout,

    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
}

pub type GossipResult<T> = Result<T, GossipError>;
