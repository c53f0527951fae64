//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use protocol_failover::control::Control;
use protocol_failover::{
    ConnectivityMonitor, DynamicConfig, NetworkState, NetworkType, ResetScheduler, Selector,
    StaticCatalog, TunnelMonitor,
};
use tempfile::NamedTempFile;

pub const CATALOG_JSON: &str = r#"{
    "protocols": [
        { "name": "WireGuard", "ports": ["443", "51820"] },
        { "name": "IKEv2", "ports": ["500"] },
        { "name": "OpenVPN", "ports": [] },
        { "name": "Stealth", "ports": ["443"] }
    ],
    "preferred": {
        "office": { "protocol": "Stealth", "port": "443" }
    }
}"#;

/// Write the shared catalog to a temp file the way the daemon reads it.
pub fn catalog_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create catalog file");
    file.write_all(CATALOG_JSON.as_bytes())
        .expect("write catalog file");
    file
}

/// Wire a control context the way `failover_selector` does, starting on
/// the given wifi network.
pub fn daemon(network: &str) -> Control {
    let file = catalog_file();
    let catalog = Arc::new(StaticCatalog::load(file.path()).expect("load catalog"));
    let connectivity = Arc::new(ConnectivityMonitor::new(NetworkState::connected(
        NetworkType::Wifi,
        Some(network),
    )));
    let tunnel = TunnelMonitor::new();
    let config = DynamicConfig::new();
    let selector = Arc::new(Selector::new(
        catalog.clone(),
        connectivity.clone(),
        Arc::new(tunnel.clone()),
        config.clone(),
    ));
    Control {
        scheduler: Arc::new(ResetScheduler::new(selector.clone())),
        selector,
        config,
        catalog,
        connectivity,
        tunnel,
    }
}

/// Protocol names of the current list, in order.
pub fn order(control: &Control) -> Vec<String> {
    control
        .selector
        .snapshot_for_display()
        .into_iter()
        .map(|e| e.port.protocol)
        .collect()
}
