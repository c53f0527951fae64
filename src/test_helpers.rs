#![cfg(any(test, feature = "test-internals"))]
#![allow(dead_code)] // Allow unused helpers - not every test binary uses all of them

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::candidate::{CandidateEntry, CandidateState, IKEV2, STEALTH, WIREGUARD};
use crate::catalog::StaticCatalog;
use crate::config::DynamicConfig;
use crate::network::{ConnectivityMonitor, NetworkState, NetworkType};
use crate::selector::Selector;
use crate::tunnel::TunnelMonitor;

/// Catalog used by most tests: WireGuard:443, IKEv2:500, Stealth:443.
pub fn test_catalog() -> StaticCatalog {
    StaticCatalog::new([
        (WIREGUARD, vec!["443", "51820"]),
        (IKEV2, vec!["500", "4500"]),
        (STEALTH, vec!["443"]),
    ])
}

/// Check the list invariants that must hold after any operation.
pub fn assert_invariants(entries: &[CandidateEntry]) {
    let mut seen = FxHashSet::default();
    for entry in entries {
        assert!(
            seen.insert(entry.port.protocol.as_str()),
            "duplicate protocol {}",
            entry.port.protocol
        );
    }

    let connected = entries.iter().filter(|e| e.state.is_connected()).count();
    let next_up = entries.iter().filter(|e| e.state.is_next_up()).count();
    assert!(connected <= 1, "{} connected entries", connected);
    assert!(next_up <= 1, "{} next-up entries", next_up);
    assert!(
        connected == 0 || next_up == 0,
        "connected and next-up entries at the same time"
    );

    if let Some(head) = entries.first()
        && head.state == CandidateState::Failed
    {
        assert!(
            entries.iter().all(|e| e.state.is_failed()),
            "failed entry leads while others are still usable"
        );
    }
}

/// A selector wired to in-memory collaborators on a named wifi network.
pub struct TestHarness {
    pub catalog: Arc<StaticCatalog>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub tunnel: TunnelMonitor,
    pub config: DynamicConfig,
    pub selector: Arc<Selector>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_catalog(test_catalog())
    }

    pub fn with_catalog(catalog: StaticCatalog) -> Self {
        let catalog = Arc::new(catalog);
        let connectivity = Arc::new(ConnectivityMonitor::new(NetworkState::connected(
            NetworkType::Wifi,
            Some("home"),
        )));
        let tunnel = TunnelMonitor::new();
        let config = DynamicConfig::new();
        let selector = Arc::new(Selector::new(
            catalog.clone(),
            connectivity.clone(),
            Arc::new(tunnel.clone()),
            config.clone(),
        ));
        Self {
            catalog,
            connectivity,
            tunnel,
            config,
            selector,
        }
    }

    /// Protocol names in list order.
    pub fn order(&self) -> Vec<String> {
        self.selector
            .snapshot_for_display()
            .iter()
            .map(|e| e.port.protocol.clone())
            .collect()
    }

    pub fn check(&self) {
        assert_invariants(&self.selector.snapshot_for_display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::ProtocolPort;

    #[test]
    #[should_panic(expected = "duplicate protocol")]
    fn test_invariants_reject_duplicate_protocols() {
        assert_invariants(&[
            CandidateEntry::new(ProtocolPort::new(WIREGUARD, "443")),
            CandidateEntry::new(ProtocolPort::new(WIREGUARD, "51820")),
        ]);
    }
}
