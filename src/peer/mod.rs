//! The peer-wire metadata fetcher (C6): BT handshake, ut_metadata
//! extension negotiation, piece-wise download, SHA-1 verification,
//! decode into a `Torrent`.
use thiserror::Error;

pub mod extended;
pub mod handshake;
pub mod metadata;

pub use handshake::Handshake;
pub use metadata::{fetch_metadata, MetadataSession};

#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("handshake protocol identifier mismatch")]
    HandshakeInvalidProtocol,

    #[error("handshake info hash mismatch")]
    HandshakeInfoHashMismatch,

    #[error("remote peer does not support the extension protocol")]
    ExtensionsUnsupported,

    #[error("remote peer's extended handshake is missing ut_metadata")]
    UtMetadataUnsupported,

    #[error(transparent)]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("metadata exceeds the maximum accepted size ({0} bytes)")]
    MetadataTooLarge(u32),

    #[error("fetched metadata failed SHA-1 verification against the infohash")]
    IntegrityFailure,

    #[error(transparent)]
    TorrentDecode(#[from] crate::torrent::TorrentDecodeError),

    #[error("peer sent a malformed or unexpected message")]
    ProtocolMalformed,

    #[error("operation timed out")]
    Timeout,
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;
