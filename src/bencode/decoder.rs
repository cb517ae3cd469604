//! Byte-oriented bencode decoding.
//!
//! Every typed decoder here takes `(bytes, start)` and returns
//! `(Value, bytes_consumed)` — consumed length, not an absolute end index.
//! This is the semantics the wider crate standardises on (see spec Open
//! Questions: earlier revisions of this kind of decoder disagreed on
//! whether the returned position was an end index or a consumed count;
//! bytes-consumed composes cleanly when a value is embedded inside a
//! larger buffer, which is exactly the situation the `ut_metadata` piece
//! messages put us in).
use std::collections::BTreeMap;

use super::{BencodeError, BencodeResult, Value};

/// Decodes a single value from the start of `data` and fails if any bytes
/// remain afterwards.
pub fn decode_all(data: &[u8]) -> BencodeResult<Value> {
    let (value, consumed) = decode(data, 0)?;
    if consumed != data.len() {
        return Err(BencodeError::TrailingBytes);
    }
    Ok(value)
}

/// Decodes a single value starting at `start`, returning the value and the
/// number of bytes consumed from `start`.
pub fn decode(data: &[u8], start: usize) -> BencodeResult<(Value, usize)> {
    match data.get(start) {
        Some(b'i') => {
            let (i, n) = decode_int(data, start)?;
            Ok((Value::Int(i), n))
        }
        Some(b'l') => {
            let (l, n) = decode_list(data, start)?;
            Ok((Value::List(l), n))
        }
        Some(b'd') => {
            let (d, n) = decode_dict(data, start)?;
            Ok((Value::Dict(d), n))
        }
        Some(b'0'..=b'9') => {
            let (s, n) = decode_string(data, start)?;
            Ok((Value::Bytes(s), n))
        }
        Some(_) => Err(BencodeError::InvalidLength),
        None => Err(BencodeError::UnexpectedEnd),
    }
}

/// Decodes a bencode byte string (`<len>:<bytes>`).
///
/// Returns the decoded bytes and the number of bytes consumed, including
/// the length prefix and the colon.
pub fn decode_string(data: &[u8], start: usize) -> BencodeResult<(Vec<u8>, usize)> {
    let colon = find(data, start, b':').ok_or(BencodeError::UnexpectedEnd)?;
    let len_bytes = &data[start..colon];
    if len_bytes.is_empty() || !len_bytes.iter().all(u8::is_ascii_digit) {
        return Err(BencodeError::InvalidLength);
    }
    let len: usize = std::str::from_utf8(len_bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(BencodeError::InvalidLength)?;

    let data_start = colon + 1;
    let data_end = data_start
        .checked_add(len)
        .ok_or(BencodeError::InvalidLength)?;
    if data_end > data.len() {
        return Err(BencodeError::UnexpectedEnd);
    }

    Ok((data[data_start..data_end].to_vec(), data_end - start))
}

/// Decodes a bencode integer (`i<decimal>e`).
///
/// Leading zeros are rejected except for the literal `0`, and `-0` is
/// rejected, matching the canonical grammar; the decoder is otherwise
/// lenient about what it accepts from the wire.
pub fn decode_int(data: &[u8], start: usize) -> BencodeResult<(i64, usize)> {
    if data.get(start) != Some(&b'i') {
        return Err(BencodeError::InvalidInteger);
    }
    let e = find(data, start + 1, b'e').ok_or(BencodeError::UnexpectedEnd)?;
    let digits = &data[start + 1..e];

    if digits.is_empty() {
        return Err(BencodeError::InvalidInteger);
    }
    let (neg, unsigned) = match digits.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, digits),
    };
    if unsigned.is_empty() || !unsigned.iter().all(u8::is_ascii_digit) {
        return Err(BencodeError::InvalidInteger);
    }
    if unsigned.len() > 1 && unsigned[0] == b'0' {
        return Err(BencodeError::InvalidInteger);
    }
    if neg && unsigned == b"0" {
        return Err(BencodeError::InvalidInteger);
    }

    let s = std::str::from_utf8(digits).map_err(|_| BencodeError::InvalidInteger)?;
    let value: i64 = s.parse().map_err(|_| BencodeError::InvalidInteger)?;
    Ok((value, e + 1 - start))
}

/// Decodes a bencode list (`l<value>*e`).
pub fn decode_list(data: &[u8], start: usize) -> BencodeResult<(Vec<Value>, usize)> {
    if data.get(start) != Some(&b'l') {
        return Err(BencodeError::InvalidList);
    }
    let mut pos = start + 1;
    let mut items = Vec::new();
    loop {
        match data.get(pos) {
            Some(b'e') => return Ok((items, pos + 1 - start)),
            Some(_) => {
                let (item, n) = decode(data, pos)?;
                items.push(item);
                pos += n;
            }
            None => return Err(BencodeError::UnexpectedEnd),
        }
    }
}

/// Decodes a bencode dict (`d(<string><value>)*e`).
///
/// Keys are not required to arrive in ascending order to decode — only
/// the encoder is required to produce that ordering — since this decoder
/// must remain lenient against arbitrary well-formed input from the wire.
pub fn decode_dict(data: &[u8], start: usize) -> BencodeResult<(BTreeMap<Vec<u8>, Value>, usize)> {
    if data.get(start) != Some(&b'd') {
        return Err(BencodeError::InvalidDict);
    }
    let mut pos = start + 1;
    let mut dict = BTreeMap::new();
    loop {
        match data.get(pos) {
            Some(b'e') => return Ok((dict, pos + 1 - start)),
            Some(_) => {
                let (key, kn) = decode_string(data, pos).map_err(|_| BencodeError::InvalidDict)?;
                pos += kn;
                let (value, vn) = decode(data, pos)?;
                pos += vn;
                dict.insert(key, value);
            }
            None => return Err(BencodeError::UnexpectedEnd),
        }
    }
}

fn find(data: &[u8], start: usize, needle: u8) -> Option<usize> {
    data[start..]
        .iter()
        .position(|&b| b == needle)
        .map(|i| start + i)
}
