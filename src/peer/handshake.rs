//! The BitTorrent handshake: the first 68 bytes exchanged over a peer
//! TCP connection. Verifies both sides agree on the torrent (via
//! info_hash) and that the remote supports the extension protocol we
//! need for ut_metadata.
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::instrument;

use super::{PeerError, PeerResult};

/// Bit 44 (byte 5, bit 0x10) of the reserved field signals BEP-10
/// extension protocol support.
const EXTENSION_BIT: u8 = 0x10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub reserved: [u8; 8],
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        let mut reserved = [0u8; 8];
        reserved[5] |= EXTENSION_BIT;
        Handshake {
            reserved,
            info_hash,
            peer_id,
        }
    }

    pub fn supports_extensions(&self) -> bool {
        self.reserved[5] & EXTENSION_BIT != 0
    }

    pub fn serialize(&self) -> [u8; 68] {
        let mut buf = [0u8; 68];
        buf[0] = 19;
        buf[1..20].copy_from_slice(b"BitTorrent protocol");
        buf[20..28].copy_from_slice(&self.reserved);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    #[instrument(level = "trace", skip(stream))]
    pub async fn read(stream: &mut TcpStream) -> PeerResult<Self> {
        let mut buf = [0u8; 68];
        stream.read_exact(&mut buf).await?;

        if buf[0] != 19 || &buf[1..20] != b"BitTorrent protocol" {
            return Err(PeerError::HandshakeInvalidProtocol);
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&buf[20..28]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);

        Ok(Handshake {
            reserved,
            info_hash,
            peer_id,
        })
    }

    pub fn validate(&self, expected_info_hash: &[u8; 20]) -> PeerResult<()> {
        if &self.info_hash != expected_info_hash {
            return Err(PeerError::HandshakeInfoHashMismatch);
        }
        Ok(())
    }

    /// Connects, exchanges handshakes, and validates the remote's
    /// response. Fails if the remote doesn't echo our info_hash or
    /// doesn't advertise extension support.
    #[instrument(level = "debug", skip(peer_id))]
    pub async fn perform(
        stream: &mut TcpStream,
        info_hash: [u8; 20],
        peer_id: [u8; 20],
    ) -> PeerResult<Handshake> {
        let ours = Handshake::new(info_hash, peer_id);
        stream.write_all(&ours.serialize()).await?;

        let theirs = Handshake::read(stream).await?;
        theirs.validate(&info_hash)?;
        if !theirs.supports_extensions() {
            return Err(PeerError::ExtensionsUnsupported);
        }
        Ok(theirs)
    }
}
