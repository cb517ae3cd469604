//! Runtime configuration knobs (§6). Not CLI/file parsing, just the
//! plain struct those would populate.
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Base UDP port for the DHT; each additional DHT node instance uses
    /// `port + i`.
    pub port: u16,
    /// Prefer IPv6 bind over IPv4 when true.
    pub ipv6: bool,
    pub routing_table_size: usize,
    pub rate_limit_bps: u64,
    pub rate_burst_bytes: u64,
    pub fetcher_workers: usize,
    pub udp_timeout: Duration,
    pub tcp_timeout: Duration,
    pub blacklist_size: usize,
    pub skip_tags: Vec<String>,
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 6881,
            ipv6: false,
            routing_table_size: 2000,
            rate_limit_bps: 100_000,
            rate_burst_bytes: 2_000_000,
            fetcher_workers: 3,
            udp_timeout: Duration::from_secs(15),
            tcp_timeout: Duration::from_secs(15),
            blacklist_size: 1000,
            skip_tags: Vec::new(),
            batch_size: 32,
        }
    }
}

/// Bootstrap routers seeded by default, per §6.
pub const BOOTSTRAP_ROUTERS: &[&str] = &[
    "router.bittorrent.com:6881",
    "dht.transmissionbt.com:6881",
    "router.utorrent.com:6881",
    "dht.aelitis.com:6881",
    "dht.libtorrent.org:25401",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.routing_table_size, 2000);
        assert_eq!(cfg.blacklist_size, 1000);
        assert_eq!(cfg.fetcher_workers, 3);
        assert_eq!(BOOTSTRAP_ROUTERS.len(), 5);
    }
}
