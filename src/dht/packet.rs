//! Inbound/outbound UDP datagram shapes used between the reader/writer
//! tasks and the dispatch loop.
use std::net::SocketAddr;

pub struct InboundPacket {
    pub bytes: Vec<u8>,
    pub from: SocketAddr,
}

pub struct OutboundPacket {
    pub bytes: Vec<u8>,
    pub to: SocketAddr,
}

/// A peer announcement surfaced to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncedPeer {
    pub addr: SocketAddr,
    pub infohash: crate::infohash::Infohash,
}
