//! Static candidate lists for discovery
//!
//! The lists are data, not control flow: the locator walks whatever this
//! structure holds, and the config file can replace any of them.

use serde::{Deserialize, Serialize};

fn default_scheme() -> String {
    "http".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_batch_size() -> usize {
    10
}

/// Same-subnet peers asked for a self-reported public address
fn default_peer_hosts() -> Vec<String> {
    ["192.168.1.19", "192.168.0.19", "192.168.1.100"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// mDNS names of the camera host, in both casings seen in the field
fn default_hostnames() -> Vec<String> {
    ["rpi5desktop.local", "RPI5DESKTOP.local"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Home routers first, then phone hotspots, then corporate ranges
fn default_subnet_prefixes() -> Vec<String> {
    [
        "192.168.1",
        "192.168.0",
        "192.168.43",
        "172.20.10",
        "10.0.0",
        "192.168.2",
        "192.168.100",
        "10.0.1",
        "172.16.0",
        "10.193.174",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Previously observed octets (19, 156), then small and round numbers
fn default_host_octets() -> Vec<u8> {
    vec![19, 156, 2, 3, 4, 5, 10, 20, 50, 100, 101, 150, 200]
}

/// Ordered candidate configuration for [`Locator::discover`](super::Locator::discover)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateConfig {
    /// URL scheme for every candidate
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Port the camera server listens on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Hosts queried for `/get_public_url`
    #[serde(default = "default_peer_hosts")]
    pub peer_hosts: Vec<String>,
    /// Hostnames probed directly
    #[serde(default = "default_hostnames")]
    pub hostnames: Vec<String>,
    /// Subnet prefixes (first three octets, no trailing dot)
    #[serde(default = "default_subnet_prefixes")]
    pub subnet_prefixes: Vec<String>,
    /// Last octets tried in every prefix
    #[serde(default = "default_host_octets")]
    pub host_octets: Vec<u8>,
    /// Probes in flight per sweep batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            port: default_port(),
            peer_hosts: default_peer_hosts(),
            hostnames: default_hostnames(),
            subnet_prefixes: default_subnet_prefixes(),
            host_octets: default_host_octets(),
            batch_size: default_batch_size(),
        }
    }
}

impl CandidateConfig {
    /// Build `scheme://host:port`
    pub fn address(&self, host: &str) -> String {
        format!("{}://{}:{}", self.scheme, host, self.port)
    }

    pub fn peer_addresses(&self) -> Vec<String> {
        self.peer_hosts.iter().map(|h| self.address(h)).collect()
    }

    pub fn hostname_addresses(&self) -> Vec<String> {
        self.hostnames.iter().map(|h| self.address(h)).collect()
    }

    /// Prefix-major Cartesian product of subnets and octets
    pub fn sweep_addresses(&self) -> Vec<String> {
        self.subnet_prefixes
            .iter()
            .flat_map(|prefix| {
                let prefix = prefix.trim_end_matches('.');
                self.host_octets
                    .iter()
                    .map(move |octet| self.address(&format!("{prefix}.{octet}")))
            })
            .collect()
    }

    /// Sweep batch size, never zero
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}
