//! BEP-10 extended message framing: `<u32 BE length><payload>`, where an
//! extended-protocol payload starts with `20` (the extended message id)
//! followed by a per-connection sub-id (0 = handshake).
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::bencode::Value;

use super::{PeerError, PeerResult};

pub const MSG_EXTENDED: u8 = 20;
pub const EXT_HANDSHAKE_ID: u8 = 0;

/// Writes a length-prefixed message frame.
pub async fn send_message(stream: &mut TcpStream, payload: &[u8]) -> PeerResult<()> {
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed
        .write_u32::<BigEndian>(payload.len() as u32)
        .expect("write to Vec cannot fail");
    framed.extend_from_slice(payload);
    stream.write_all(&framed).await?;
    Ok(())
}

/// Reads one length-prefixed frame. A zero-length frame (keepalive)
/// returns an empty vector.
pub async fn read_message(stream: &mut TcpStream) -> PeerResult<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = BigEndian::read_u32(&len_buf) as usize;
    if len == 0 {
        return Ok(Vec::new());
    }
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Sends our extended handshake, advertising support for `ut_metadata`
/// under local id 1.
pub async fn send_extended_handshake(stream: &mut TcpStream) -> PeerResult<()> {
    let m = Value::dict([(b"m".to_vec(), Value::dict([(b"ut_metadata".to_vec(), Value::Int(1))]))]);
    let body = crate::bencode::encode(&m);

    let mut payload = Vec::with_capacity(2 + body.len());
    payload.push(MSG_EXTENDED);
    payload.push(EXT_HANDSHAKE_ID);
    payload.extend_from_slice(&body);
    send_message(stream, &payload).await
}

/// The remote's advertised `ut_metadata` sub-id and the metadata size it
/// offered, parsed from its extended handshake payload.
pub struct RemoteExtensions {
    pub ut_metadata_id: u8,
    pub metadata_size: u32,
}

pub fn parse_extended_handshake(payload: &[u8]) -> PeerResult<RemoteExtensions> {
    let value = crate::bencode::decode_all(payload)?;
    let m = value.get_dict(b"m")?;
    let ut_metadata_id = m
        .get(b"ut_metadata".as_slice())
        .ok_or(crate::bencode::BencodeError::MissingKey)?
        .as_int()?;
    let metadata_size = value.get_int(b"metadata_size")?;

    if !(0..=u8::MAX as i64).contains(&ut_metadata_id) {
        return Err(PeerError::ProtocolMalformed);
    }
    if metadata_size < 0 {
        return Err(PeerError::ProtocolMalformed);
    }

    Ok(RemoteExtensions {
        ut_metadata_id: ut_metadata_id as u8,
        metadata_size: metadata_size as u32,
    })
}

/// Builds a `ut_metadata` piece request message for `piece`.
pub fn build_request_message(remote_ut_metadata_id: u8, piece: u32) -> Vec<u8> {
    let request = Value::dict([
        (b"msg_type".to_vec(), Value::Int(0)),
        (b"piece".to_vec(), Value::Int(piece as i64)),
    ]);
    let body = crate::bencode::encode(&request);

    let mut payload = Vec::with_capacity(2 + body.len());
    payload.push(MSG_EXTENDED);
    payload.push(remote_ut_metadata_id);
    payload.extend_from_slice(&body);
    payload
}
