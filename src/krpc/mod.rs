//! KRPC message construction and parsing (BEP-5).
use std::net::SocketAddr;

use rand::Rng;
use thiserror::Error;

use crate::bencode::{BencodeError, Value};

pub mod compact;

pub use compact::{
    decode_compact_node, decode_compact_nodes, decode_peer_addr, encode_compact_node,
    encode_peer_addr, CompactNode,
};

const TRANSACTION_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Error)]
pub enum KrpcError {
    #[error(transparent)]
    Bencode(#[from] BencodeError),

    #[error("unrecognized message type {0:?}")]
    UnknownMessageType(Vec<u8>),

    #[error("krpc error response: {0} {1}")]
    Remote(i64, String),
}

/// A random 2-byte transaction id drawn from a 52-letter alphabet.
///
/// Transactions are not tracked: the crawler accepts any well-formed
/// response regardless of which transaction it answers.
pub fn new_transaction_id() -> Vec<u8> {
    let mut rng = rand::rng();
    (0..2)
        .map(|_| TRANSACTION_ALPHABET[rng.random_range(0..TRANSACTION_ALPHABET.len())])
        .collect()
}

/// The parsed shape of an inbound KRPC message, dispatched on `y`.
pub enum Message<'a> {
    Query {
        transaction: &'a [u8],
        method: &'a [u8],
        args: &'a Value,
    },
    Response {
        transaction: &'a [u8],
        result: &'a Value,
    },
    Error {
        transaction: &'a [u8],
        code: i64,
        message: String,
    },
}

/// Dispatches a decoded bencode value into a query/response/error shape
/// by its `y` key.
pub fn parse(value: &Value) -> Result<Message<'_>, KrpcError> {
    let transaction = value.get_bytes(b"t").unwrap_or(b"");
    let y = value.get_bytes(b"y")?;
    match y {
        b"q" => Ok(Message::Query {
            transaction,
            method: value.get_bytes(b"q")?,
            args: value.get(b"a")?,
        }),
        b"r" => Ok(Message::Response {
            transaction,
            result: value.get(b"r")?,
        }),
        b"e" => {
            let e = value.get_list(b"e")?;
            let code = e.first().and_then(|v| v.as_int().ok()).unwrap_or(0);
            let message = e
                .get(1)
                .and_then(|v| v.as_bytes().ok())
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            Ok(Message::Error {
                transaction,
                code,
                message,
            })
        }
        other => Err(KrpcError::UnknownMessageType(other.to_vec())),
    }
}

/// Builds a query message: `{t, y: "q", q: <method>, a: <args>}`.
pub fn make_query(transaction: &[u8], method: &str, args: Value) -> Value {
    Value::dict([
        (b"t".to_vec(), Value::bytes(transaction.to_vec())),
        (b"y".to_vec(), Value::bytes("q")),
        (b"q".to_vec(), Value::bytes(method)),
        (b"a".to_vec(), args),
    ])
}

/// Builds a response message: `{t, y: "r", r: <result>}`.
pub fn make_response(transaction: &[u8], result: Value) -> Value {
    Value::dict([
        (b"t".to_vec(), Value::bytes(transaction.to_vec())),
        (b"y".to_vec(), Value::bytes("r")),
        (b"r".to_vec(), result),
    ])
}

/// Builds an error message: `{t, y: "e", e: [code, message]}`.
pub fn make_error(transaction: &[u8], code: i64, message: &str) -> Value {
    Value::dict([
        (b"t".to_vec(), Value::bytes(transaction.to_vec())),
        (b"y".to_vec(), Value::bytes("e")),
        (
            b"e".to_vec(),
            Value::List(vec![Value::Int(code), Value::bytes(message)]),
        ),
    ])
}

/// Resolves the effective peer address for an `announce_peer` query: if
/// `implied_port` is set, the host is kept but the port is replaced with
/// the UDP packet's actual source port.
pub fn resolve_announced_addr(source: SocketAddr, implied_port: i64, port: i64) -> SocketAddr {
    if implied_port != 0 {
        source
    } else {
        SocketAddr::new(source.ip(), port as u16)
    }
}
