//! Catalog of supported protocols, their ports, and per-network pinned
//! preferences.
//!
//! The selector only reads the catalog. [`StaticCatalog`] is the in-memory
//! implementation used by the daemon and the tests; it can be loaded from a
//! JSON file:
//!
//! ```json
//! {
//!   "protocols": [
//!     { "name": "WireGuard", "ports": ["443", "51820"] },
//!     { "name": "IKEv2", "ports": ["500"] }
//!   ],
//!   "preferred": { "HomeWifi": { "protocol": "IKEv2", "port": "500" } }
//! }
//! ```

use std::path::Path;
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::candidate::{
    CandidateList, IKEV2, ProtocolPort, STEALTH, TCP, UDP, WIREGUARD, WSTUNNEL,
};

/// Read side of the catalog store.
pub trait Catalog: Send + Sync {
    /// Protocol names in the app's preferred order.
    fn supported_protocols_in_preference_order(&self) -> Vec<String>;

    /// First configured port for `protocol`, if any.
    fn default_port_for(&self, protocol: &str) -> Option<String>;

    /// Pinned protocol/port for the network identified by `network`.
    fn preferred_protocol_for(&self, network: &str) -> Option<ProtocolPort>;
}

/// Ordering used when the catalog has no port map at all.
pub fn fallback_order() -> CandidateList {
    CandidateList::from_ports([
        ProtocolPort::new(WIREGUARD, "443"),
        ProtocolPort::new(IKEV2, "500"),
        ProtocolPort::new(UDP, "443"),
        ProtocolPort::new(TCP, "443"),
        ProtocolPort::new(STEALTH, "443"),
        ProtocolPort::new(WSTUNNEL, "443"),
    ])
}

/// Build the cold candidate ordering: every catalog protocol with a default
/// port, in catalog order, all `Normal`.
pub fn build_catalog_order(catalog: &dyn Catalog) -> CandidateList {
    let protocols = catalog.supported_protocols_in_preference_order();
    let list = CandidateList::from_ports(protocols.iter().filter_map(|name| {
        match catalog.default_port_for(name) {
            Some(port) => Some(ProtocolPort::new(name.as_str(), port)),
            None => {
                debug!("{} has no configured port, skipping", name);
                None
            }
        }
    }));

    if list.is_empty() {
        warn!("catalog has no ports, using built-in protocol order");
        return fallback_order();
    }
    list
}

#[derive(Clone, Debug, Deserialize)]
struct ProtocolDef {
    name: String,
    #[serde(default)]
    ports: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    protocols: Vec<ProtocolDef>,
    #[serde(default)]
    preferred: FxHashMap<String, ProtocolPort>,
}

/// In-memory catalog. Network preferences may be edited at runtime.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    protocols: Vec<(String, Vec<String>)>,
    preferred: RwLock<FxHashMap<String, ProtocolPort>>,
}

impl StaticCatalog {
    pub fn new<P, S>(protocols: impl IntoIterator<Item = (P, Vec<S>)>) -> Self
    where
        P: Into<String>,
        S: Into<String>,
    {
        Self {
            protocols: protocols
                .into_iter()
                .map(|(name, ports)| (name.into(), ports.into_iter().map(Into::into).collect()))
                .collect(),
            preferred: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json).context("parse catalog json")?;
        Ok(Self {
            protocols: file
                .protocols
                .into_iter()
                .map(|def| (def.name, def.ports))
                .collect(),
            preferred: RwLock::new(file.preferred),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read catalog {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("load catalog {}", path.display()))
    }

    /// Pin `port` for `network`, or clear the pin with `None`.
    pub fn set_preferred(&self, network: &str, port: Option<ProtocolPort>) {
        let mut guard = self
            .preferred
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match port {
            Some(port) => {
                guard.insert(network.to_owned(), port);
            }
            None => {
                guard.remove(network);
            }
        }
    }

    /// All configured ports for `protocol`.
    pub fn ports_for(&self, protocol: &str) -> &[String] {
        self.protocols
            .iter()
            .find(|(name, _)| name == protocol)
            .map(|(_, ports)| ports.as_slice())
            .unwrap_or(&[])
    }
}

impl Catalog for StaticCatalog {
    fn supported_protocols_in_preference_order(&self) -> Vec<String> {
        self.protocols.iter().map(|(name, _)| name.clone()).collect()
    }

    fn default_port_for(&self, protocol: &str) -> Option<String> {
        self.ports_for(protocol).first().cloned()
    }

    fn preferred_protocol_for(&self, network: &str) -> Option<ProtocolPort> {
        self.preferred
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(network)
            .cloned()
    }
}
