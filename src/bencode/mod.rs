//! Bencode encoding and decoding.
//!
//! Bencode is the binary-safe serialisation format used throughout the
//! BitTorrent ecosystem: by KRPC messages on the DHT wire and by the
//! `ut_metadata` extension on the peer wire. Both paths carry untrusted
//! bytes, so every decoder here returns an error rather than panicking,
//! and reports how many bytes it consumed so callers can find where a
//! value ends inside a larger buffer (the metadata path needs this to
//! split a bencoded piece-message prefix from the raw piece bytes that
//! follow it).
use std::collections::BTreeMap;
use thiserror::Error;

pub mod decoder;
pub mod encoder;

pub use decoder::{decode, decode_all};
pub use encoder::encode;

/// A bencode value.
///
/// Dict keys are byte strings, not arbitrary `Value`s, and are kept in a
/// `BTreeMap` so iteration order is always ascending byte-lexical order —
/// the encoder relies on this to satisfy bencode's canonical key-ordering
/// rule without an extra sort pass.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub fn as_int(&self) -> BencodeResult<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            _ => Err(BencodeError::TypeMismatch("int")),
        }
    }

    pub fn as_bytes(&self) -> BencodeResult<&[u8]> {
        match self {
            Value::Bytes(b) => Ok(b),
            _ => Err(BencodeError::TypeMismatch("bytes")),
        }
    }

    pub fn as_list(&self) -> BencodeResult<&[Value]> {
        match self {
            Value::List(l) => Ok(l),
            _ => Err(BencodeError::TypeMismatch("list")),
        }
    }

    pub fn as_dict(&self) -> BencodeResult<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Ok(d),
            _ => Err(BencodeError::TypeMismatch("dict")),
        }
    }

    /// Fetches `key` from a dict value, failing if this isn't a dict or the
    /// key is absent.
    pub fn get(&self, key: &[u8]) -> BencodeResult<&Value> {
        self.as_dict()?.get(key).ok_or(BencodeError::MissingKey)
    }

    pub fn get_int(&self, key: &[u8]) -> BencodeResult<i64> {
        self.get(key)?.as_int()
    }

    pub fn get_bytes(&self, key: &[u8]) -> BencodeResult<&[u8]> {
        self.get(key)?.as_bytes()
    }

    pub fn get_list(&self, key: &[u8]) -> BencodeResult<&[Value]> {
        self.get(key)?.as_list()
    }

    pub fn get_dict(&self, key: &[u8]) -> BencodeResult<&BTreeMap<Vec<u8>, Value>> {
        self.get(key)?.as_dict()
    }

    pub fn bytes(s: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(s.into())
    }

    pub fn dict(pairs: impl IntoIterator<Item = (Vec<u8>, Value)>) -> Value {
        Value::Dict(pairs.into_iter().collect())
    }
}

/// Errors produced while decoding or encoding bencode.
///
/// Decoders never leak position information beyond what the caller already
/// knows (the `start` it passed in) — untrusted input means we favour
/// "reject cleanly" over "explain precisely".
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum BencodeError {
    #[error("invalid length prefix")]
    InvalidLength,

    #[error("invalid integer")]
    InvalidInteger,

    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("invalid dict")]
    InvalidDict,

    #[error("invalid list")]
    InvalidList,

    #[error("trailing bytes after value")]
    TrailingBytes,

    #[error("missing key")]
    MissingKey,

    #[error("value has the wrong type, expected {0}")]
    TypeMismatch(&'static str),
}

pub type BencodeResult<T> = std::result::Result<T, BencodeError>;
