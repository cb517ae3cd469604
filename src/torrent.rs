//! The data model produced by the metadata fetcher: `Peer`, `Torrent`,
//! `File`. Distinct from a `.torrent`-file parser — this crate never
//! reads local `.torrent` files, only decodes info dicts fetched live
//! over the peer wire.
use std::net::SocketAddr;

use thiserror::Error;

use crate::bencode::{BencodeError, Value};
use crate::infohash::Infohash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub addr: SocketAddr,
    pub infohash: Infohash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    pub infohash: Infohash,
    pub name: String,
    pub size: u64,
    pub files: Vec<File>,
    pub tags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum TorrentDecodeError {
    #[error(transparent)]
    Bencode(#[from] BencodeError),

    #[error("info dict missing required field: {0}")]
    MissingField(&'static str),
}

/// Builds a `Torrent` from a decoded info dict and the infohash it was
/// fetched for. Handles both single-file (`length`) and multi-file
/// (`files: [{length, path}]`) layouts.
pub fn torrent_from_info_dict(
    infohash: Infohash,
    info: &Value,
) -> Result<Torrent, TorrentDecodeError> {
    let name = info
        .get_bytes(b"name")
        .map_err(|_| TorrentDecodeError::MissingField("name"))
        .map(|b| String::from_utf8_lossy(b).into_owned())?;

    if let Ok(files) = info.get_list(b"files") {
        let mut parsed = Vec::with_capacity(files.len());
        let mut total = 0u64;
        for entry in files {
            let length = entry
                .get_int(b"length")
                .map_err(|_| TorrentDecodeError::MissingField("length"))? as u64;
            let path_parts = entry
                .get_list(b"path")
                .map_err(|_| TorrentDecodeError::MissingField("path"))?;
            let path = path_parts
                .iter()
                .filter_map(|p| p.as_bytes().ok())
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .collect::<Vec<_>>()
                .join("/");
            total += length;
            parsed.push(File { path, size: length });
        }
        Ok(Torrent {
            infohash,
            name,
            size: total,
            files: parsed,
            tags: Vec::new(),
        })
    } else {
        let length = info
            .get_int(b"length")
            .map_err(|_| TorrentDecodeError::MissingField("length"))? as u64;
        Ok(Torrent {
            infohash,
            name,
            size: length,
            files: Vec::new(),
            tags: Vec::new(),
        })
    }
}
