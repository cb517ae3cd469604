//! Bencode encoding.
//!
//! Writing to an in-memory `Vec<u8>` never fails, so unlike the decoder
//! side this module has no error type of its own — encoding is total.
use std::io::Write;

use tracing::instrument;

use super::Value;

#[instrument(skip(writer, s), level = "trace")]
fn encode_string<W: Write>(writer: &mut W, s: &[u8]) {
    write!(writer, "{}:", s.len()).expect("writing to Vec<u8> cannot fail");
    writer.write_all(s).expect("writing to Vec<u8> cannot fail");
}

#[instrument(skip(writer), level = "trace")]
fn encode_integer<W: Write>(writer: &mut W, i: i64) {
    write!(writer, "i{}e", i).expect("writing to Vec<u8> cannot fail");
}

#[instrument(skip(writer, list), level = "trace")]
fn encode_list<W: Write>(writer: &mut W, list: &[Value]) {
    writer.write_all(b"l").expect("writing to Vec<u8> cannot fail");
    for item in list {
        encode_value(writer, item);
    }
    writer.write_all(b"e").expect("writing to Vec<u8> cannot fail");
}

/// `BTreeMap` already iterates keys in ascending byte-lexical order, which
/// is bencode's canonical dict ordering, so there's no sort step here
/// unlike a `HashMap`-backed encoder.
#[instrument(skip(writer, dict), level = "trace")]
fn encode_dict<W: Write>(writer: &mut W, dict: &std::collections::BTreeMap<Vec<u8>, Value>) {
    writer.write_all(b"d").expect("writing to Vec<u8> cannot fail");
    for (key, value) in dict {
        encode_string(writer, key);
        encode_value(writer, value);
    }
    writer.write_all(b"e").expect("writing to Vec<u8> cannot fail");
}

#[instrument(skip(writer), level = "trace")]
fn encode_value<W: Write>(writer: &mut W, value: &Value) {
    match value {
        Value::Bytes(s) => encode_string(writer, s),
        Value::Int(i) => encode_integer(writer, *i),
        Value::List(list) => encode_list(writer, list),
        Value::Dict(dict) => encode_dict(writer, dict),
    }
}

/// Encodes `value` to its canonical bencode representation.
#[instrument(skip(value), level = "debug")]
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value(&mut buf, value);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scalars() {
        assert_eq!(encode(&Value::Int(42)), b"i42e");
        assert_eq!(encode(&Value::Int(-1)), b"i-1e");
        assert_eq!(encode(&Value::bytes("spam")), b"4:spam");
    }

    #[test]
    fn encodes_list() {
        let v = Value::List(vec![Value::bytes("spam"), Value::bytes("eggs")]);
        assert_eq!(encode(&v), b"l4:spam4:eggse");
    }

    #[test]
    fn encodes_dict_in_key_order() {
        let v = Value::dict([
            (b"spam".to_vec(), Value::bytes("eggs")),
            (b"cow".to_vec(), Value::bytes("moo")),
        ]);
        assert_eq!(encode(&v), b"d3:cow3:moo4:spam4:eggse");
    }

    #[test]
    fn round_trips_through_decoder() {
        let v = Value::dict([(
            b"a".to_vec(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::bytes("x")]),
        )]);
        let encoded = encode(&v);
        let decoded = super::super::decode_all(&encoded).unwrap();
        assert_eq!(v, decoded);
    }
}
