//! Per-announced-infohash TCP session: connects to a peer, negotiates
//! `ut_metadata`, downloads the info dict piece by piece, verifies it
//! against the infohash, and decodes it into a `Torrent`.
use std::net::SocketAddr;
use std::time::Duration;

use rand::RngCore;
use sha1::{Digest, Sha1};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::infohash::Infohash;
use crate::torrent::{torrent_from_info_dict, Torrent};

use super::extended::{self, MSG_EXTENDED};
use super::handshake::Handshake;
use super::{PeerError, PeerResult};

pub const BLOCK_SIZE: u32 = 16384;
pub const MAX_METADATA_SIZE: u32 = BLOCK_SIZE * 1000;

#[allow(dead_code)]
const MSG_TYPE_REQUEST: i64 = 0;
const MSG_TYPE_DATA: i64 = 1;
const MSG_TYPE_REJECT: i64 = 2;

/// Transient per-fetch state: one per (infohash, peer) pairing.
pub struct MetadataSession {
    pub peer_addr: SocketAddr,
    pub infohash: Infohash,
    pub ut_metadata_id: u8,
    pub total_pieces: u32,
    pub pieces: Vec<Option<Vec<u8>>>,
    pub metadata_size: u32,
}

impl MetadataSession {
    fn new(peer_addr: SocketAddr, infohash: Infohash, ut_metadata_id: u8, metadata_size: u32) -> Self {
        let total_pieces = metadata_size.div_ceil(BLOCK_SIZE).max(1);
        MetadataSession {
            peer_addr,
            infohash,
            ut_metadata_id,
            total_pieces,
            pieces: vec![None; total_pieces as usize],
            metadata_size,
        }
    }

    fn is_done(&self) -> bool {
        self.pieces.iter().all(Option::is_some)
    }

    /// Length a piece at `index` is expected to have.
    fn expected_len(&self, index: u32) -> u32 {
        if index + 1 == self.total_pieces {
            let rem = self.metadata_size % BLOCK_SIZE;
            if rem == 0 {
                BLOCK_SIZE
            } else {
                rem
            }
        } else {
            BLOCK_SIZE
        }
    }

    fn assemble(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.metadata_size as usize);
        for piece in &self.pieces {
            out.extend_from_slice(piece.as_ref().expect("is_done checked before assemble"));
        }
        out
    }
}

/// Runs a full metadata fetch against one peer for one infohash,
/// producing a verified `Torrent` or a classified failure.
#[instrument(level = "debug", skip(infohash), fields(infohash = %infohash, peer = %peer_addr))]
pub async fn fetch_metadata(
    peer_addr: SocketAddr,
    infohash: Infohash,
    tcp_timeout: Duration,
) -> PeerResult<Torrent> {
    let mut stream = timeout(tcp_timeout, TcpStream::connect(peer_addr))
        .await
        .map_err(|_| PeerError::Timeout)??;
    stream.set_linger(Some(Duration::from_secs(0)))?;

    let mut our_peer_id = [0u8; 20];
    rand::rng().fill_bytes(&mut our_peer_id);

    timeout(
        tcp_timeout,
        Handshake::perform(&mut stream, *infohash.as_bytes(), our_peer_id),
    )
    .await
    .map_err(|_| PeerError::Timeout)??;

    timeout(tcp_timeout, extended::send_extended_handshake(&mut stream))
        .await
        .map_err(|_| PeerError::Timeout)??;

    let mut session: Option<MetadataSession> = None;

    loop {
        let payload = timeout(tcp_timeout, extended::read_message(&mut stream))
            .await
            .map_err(|_| PeerError::Timeout)??;

        if payload.is_empty() {
            continue; // keepalive
        }
        if payload[0] != MSG_EXTENDED {
            continue; // not an extension message; ignore non-ut_metadata traffic
        }
        if payload.len() < 2 {
            return Err(PeerError::ProtocolMalformed);
        }
        let extended_id = payload[1];
        let body = &payload[2..];

        if extended_id == extended::EXT_HANDSHAKE_ID {
            if session.is_some() {
                return Err(PeerError::ProtocolMalformed);
            }
            let remote = extended::parse_extended_handshake(body)?;
            if remote.metadata_size > MAX_METADATA_SIZE {
                return Err(PeerError::MetadataTooLarge(remote.metadata_size));
            }
            let new_session =
                MetadataSession::new(peer_addr, infohash, remote.ut_metadata_id, remote.metadata_size);
            request_all_pieces(&mut stream, &new_session, tcp_timeout).await?;
            session = Some(new_session);
            continue;
        }

        let session = session.as_mut().ok_or(PeerError::ProtocolMalformed)?;

        let (dict, consumed) = crate::bencode::decode(body, 0)?;
        let msg_type = dict.get_int(b"msg_type")?;
        if msg_type == MSG_TYPE_REJECT {
            debug!("peer rejected a piece request");
            continue;
        }
        if msg_type != MSG_TYPE_DATA {
            continue;
        }
        let piece = dict.get_int(b"piece")?;
        if piece < 0 || piece as u32 >= session.total_pieces {
            return Err(PeerError::ProtocolMalformed);
        }
        let piece = piece as u32;
        let raw = &body[consumed..];
        if raw.len() as u32 != session.expected_len(piece) {
            warn!(piece, "piece length mismatch");
            return Err(PeerError::ProtocolMalformed);
        }
        session.pieces[piece as usize] = Some(raw.to_vec());

        if session.is_done() {
            let metadata = session.assemble();
            let digest = Sha1::digest(&metadata);
            if digest.as_slice() != infohash.as_bytes() {
                return Err(PeerError::IntegrityFailure);
            }
            let info = crate::bencode::decode_all(&metadata)?;
            return Ok(torrent_from_info_dict(infohash, &info)?);
        }
    }
}

async fn request_all_pieces(
    stream: &mut TcpStream,
    session: &MetadataSession,
    tcp_timeout: Duration,
) -> PeerResult<()> {
    for piece in 0..session.total_pieces {
        let msg = extended::build_request_message(session.ut_metadata_id, piece);
        timeout(tcp_timeout, extended::send_message(stream, &msg))
            .await
            .map_err(|_| PeerError::Timeout)??;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_piece_count_and_last_piece_length() {
        let session = MetadataSession::new(
            "127.0.0.1:1".parse().unwrap(),
            Infohash::random(),
            1,
            32,
        );
        assert_eq!(session.total_pieces, 1);
        assert_eq!(session.expected_len(0), 32);

        let session = MetadataSession::new(
            "127.0.0.1:1".parse().unwrap(),
            Infohash::random(),
            1,
            BLOCK_SIZE + 10,
        );
        assert_eq!(session.total_pieces, 2);
        assert_eq!(session.expected_len(0), BLOCK_SIZE);
        assert_eq!(session.expected_len(1), 10);
    }

    #[test]
    fn is_done_requires_every_piece_present() {
        let mut session = MetadataSession::new(
            "127.0.0.1:1".parse().unwrap(),
            Infohash::random(),
            1,
            BLOCK_SIZE + 10,
        );
        assert!(!session.is_done());
        session.pieces[0] = Some(vec![0u8; BLOCK_SIZE as usize]);
        assert!(!session.is_done());
        session.pieces[1] = Some(vec![0u8; 10]);
        assert!(session.is_done());
    }
}
