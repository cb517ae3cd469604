//! The DHT participation engine (C5): UDP socket, packet dispatch,
//! bootstrap/refresh, rate-limited outbound send, neighbour-ID
//! spoofing.
use thiserror::Error;

pub mod handlers;
pub mod node;
pub mod packet;
pub mod rate_limiter;

pub use node::{DhtNode, DhtNodeHandle};
pub use packet::AnnouncedPeer;

#[derive(Debug, Error)]
pub enum DhtError {
    #[error("failed to bind UDP socket: {0}")]
    Fatal(#[from] std::io::Error),

    #[error(transparent)]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error(transparent)]
    Krpc(#[from] crate::krpc::KrpcError),
}

pub type DhtResult<T> = std::result::Result<T, DhtError>;
