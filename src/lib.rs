//! Library root for dhtcrawl.
//!
//! Re-exports every core module: the bencode codec, infohash identity,
//! KRPC message layer, routing table, DHT participation engine,
//! peer-wire metadata fetcher, torrent data model, coordinator, byte-slab
//! pool, and the external-collaborator boundaries (store, tagger) plus
//! the ambient stack (config, stats, blacklists).
pub mod bencode;
pub mod blacklist;
pub mod config;
pub mod coordinator;
pub mod dht;
pub mod infohash;
pub mod krpc;
pub mod peer;
pub mod routing_table;
pub mod slab;
pub mod stats;
pub mod store;
pub mod tagger;
pub mod torrent;
