//! End-to-end metadata fetch against an in-process mock TCP peer,
//! covering the happy path and the SHA-1 integrity failure path (spec
//! seed tests 4 and 5).
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use dhtcrawl::bencode::{self, Value};
use dhtcrawl::infohash::Infohash;
use dhtcrawl::peer::{fetch_metadata, PeerError};

const OUR_UT_METADATA_ID: u8 = 2;

async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = BigEndian::read_u32(&len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    payload
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) {
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.write_u32::<BigEndian>(payload.len() as u32).unwrap();
    framed.extend_from_slice(payload);
    stream.write_all(&framed).await.unwrap();
}

/// Runs the peer side of the protocol up through sending the extended
/// handshake advertising `metadata_size`, then hands back the socket
/// for the caller to send data pieces on.
async fn mock_handshake(stream: &mut TcpStream, metadata_size: u32) {
    let mut buf = [0u8; 68];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf[0], 19);
    assert_eq!(&buf[1..20], b"BitTorrent protocol");
    let info_hash = buf[28..48].to_vec();

    let mut reply = [0u8; 68];
    reply[0] = 19;
    reply[1..20].copy_from_slice(b"BitTorrent protocol");
    reply[25] |= 0x10;
    reply[28..48].copy_from_slice(&info_hash);
    reply[48..68].copy_from_slice(&[9u8; 20]);
    stream.write_all(&reply).await.unwrap();

    // Client's extended handshake: [20, 0, bencode(...)].
    let ext = read_frame(stream).await;
    assert_eq!(ext[0], 20);
    assert_eq!(ext[1], 0);

    let handshake = Value::dict([(
        b"m".to_vec(),
        Value::dict([(b"ut_metadata".to_vec(), Value::Int(OUR_UT_METADATA_ID as i64))]),
    )]);
    let mut handshake_dict = handshake.as_dict().unwrap().clone();
    handshake_dict.insert(b"metadata_size".to_vec(), Value::Int(metadata_size as i64));
    let body = bencode::encode(&Value::Dict(handshake_dict));

    let mut payload = vec![20u8, 0u8];
    payload.extend_from_slice(&body);
    write_frame(stream, &payload).await;
}

async fn mock_serve_single_piece(mut stream: TcpStream, metadata: Vec<u8>) {
    mock_handshake(&mut stream, metadata.len() as u32).await;

    // Client eagerly requests every piece (just one, here) before we
    // finish reading its requests.
    let request = read_frame(&mut stream).await;
    assert_eq!(request[0], 20);
    assert_eq!(request[1], OUR_UT_METADATA_ID);
    let (req_dict, _) = bencode::decode(&request[2..], 0).unwrap();
    assert_eq!(req_dict.get_int(b"msg_type").unwrap(), 0);
    assert_eq!(req_dict.get_int(b"piece").unwrap(), 0);

    let data_dict = Value::dict([
        (b"msg_type".to_vec(), Value::Int(1)),
        (b"piece".to_vec(), Value::Int(0)),
        (b"total_size".to_vec(), Value::Int(metadata.len() as i64)),
    ]);
    let mut payload = vec![20u8, OUR_UT_METADATA_ID];
    payload.extend_from_slice(&bencode::encode(&data_dict));
    payload.extend_from_slice(&metadata);
    write_frame(&mut stream, &payload).await;
}

fn info_dict_bytes() -> Vec<u8> {
    let info = Value::dict([
        (b"name".to_vec(), Value::bytes("x")),
        (b"length".to_vec(), Value::Int(10)),
    ]);
    bencode::encode(&info)
}

#[tokio::test]
async fn happy_path_produces_verified_torrent() {
    let metadata = info_dict_bytes();
    let infohash = Infohash::from_bytes(Sha1::digest(&metadata).into());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn({
        let metadata = metadata.clone();
        async move {
            let (stream, _) = listener.accept().await.unwrap();
            mock_serve_single_piece(stream, metadata).await;
        }
    });

    let torrent = fetch_metadata(addr, infohash, Duration::from_secs(5))
        .await
        .expect("metadata fetch should succeed against a well-behaved mock peer");

    assert_eq!(torrent.infohash, infohash);
    assert_eq!(torrent.name, "x");
    assert_eq!(torrent.size, 10);
    assert!(torrent.files.is_empty());

    server.await.unwrap();
}

#[tokio::test]
async fn mismatched_infohash_is_an_integrity_failure() {
    let metadata = info_dict_bytes();
    // A infohash that does not match the metadata's real SHA-1.
    let wrong_infohash = Infohash::from_bytes([0xAAu8; 20]);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn({
        let metadata = metadata.clone();
        async move {
            let (stream, _) = listener.accept().await.unwrap();
            mock_serve_single_piece(stream, metadata).await;
        }
    });

    let result = fetch_metadata(addr, wrong_infohash, Duration::from_secs(5)).await;
    assert!(matches!(result, Err(PeerError::IntegrityFailure)));

    server.await.unwrap();
}

#[tokio::test]
async fn oversized_metadata_is_rejected_before_any_piece_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 68];
        stream.read_exact(&mut buf).await.unwrap();
        let info_hash = buf[28..48].to_vec();

        let mut reply = [0u8; 68];
        reply[0] = 19;
        reply[1..20].copy_from_slice(b"BitTorrent protocol");
        reply[25] |= 0x10;
        reply[28..48].copy_from_slice(&info_hash);
        stream.write_all(&reply).await.unwrap();

        let _ext = read_frame(&mut stream).await;

        let handshake = Value::dict([
            (
                b"m".to_vec(),
                Value::dict([(b"ut_metadata".to_vec(), Value::Int(1))]),
            ),
            (b"metadata_size".to_vec(), Value::Int(16_384_001)),
        ]);
        let mut payload = vec![20u8, 0u8];
        payload.extend_from_slice(&bencode::encode(&handshake));
        write_frame(&mut stream, &payload).await;

        // The client should give up without ever requesting a piece;
        // dropping the stream here would otherwise hang a read.
        let _ = stream.shutdown().await;
    });

    let result = fetch_metadata(addr, Infohash::random(), Duration::from_secs(5)).await;
    assert!(matches!(result, Err(PeerError::MetadataTooLarge(16_384_001))));

    server.await.unwrap();
}

#[tokio::test]
async fn handshake_without_extension_bit_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 68];
        stream.read_exact(&mut buf).await.unwrap();
        let info_hash = buf[28..48].to_vec();

        let mut reply = [0u8; 68];
        reply[0] = 19;
        reply[1..20].copy_from_slice(b"BitTorrent protocol");
        // Deliberately leave the extension bit (reserved[5] & 0x10) unset.
        reply[28..48].copy_from_slice(&info_hash);
        stream.write_all(&reply).await.unwrap();
    });

    let result = fetch_metadata(addr, Infohash::random(), Duration::from_secs(5)).await;
    assert!(matches!(result, Err(PeerError::ExtensionsUnsupported)));

    server.await.unwrap();
}
