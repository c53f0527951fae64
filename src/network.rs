//! Network path state as reported by the connectivity service.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    #[default]
    None,
    Wifi,
    Cellular,
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkType::None => write!(f, "none"),
            NetworkType::Wifi => write!(f, "wifi"),
            NetworkType::Cellular => write!(f, "cellular"),
        }
    }
}

impl std::str::FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(NetworkType::None),
            "wifi" => Ok(NetworkType::Wifi),
            "cellular" => Ok(NetworkType::Cellular),
            _ => Err(format!(
                "invalid network type '{}': use none, wifi or cellular",
                s
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Connected,
    #[default]
    Disconnected,
    RequiresReconnect,
}

impl std::str::FromStr for NetworkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(NetworkStatus::Connected),
            "disconnected" => Ok(NetworkStatus::Disconnected),
            "requires-reconnect" => Ok(NetworkStatus::RequiresReconnect),
            _ => Err(format!(
                "invalid network status '{}': use connected, disconnected or requires-reconnect",
                s
            )),
        }
    }
}

/// Snapshot of the device's current network path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NetworkState {
    pub network_type: NetworkType,
    pub status: NetworkStatus,
    /// SSID or carrier identifier, when known.
    pub name: Option<String>,
    pub is_tunnel_active: bool,
}

impl NetworkState {
    pub fn connected(network_type: NetworkType, name: Option<&str>) -> Self {
        Self {
            network_type,
            status: NetworkStatus::Connected,
            name: name.map(str::to_owned),
            is_tunnel_active: false,
        }
    }
}

/// Read side of the connectivity service.
pub trait Connectivity: Send + Sync {
    fn current_network(&self) -> NetworkState;
}

/// In-process connectivity service backed by a watch channel.
///
/// Identical consecutive states are swallowed, so subscribers only wake on
/// real path changes.
pub struct ConnectivityMonitor {
    tx: watch::Sender<NetworkState>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(NetworkState::default())
    }
}

impl ConnectivityMonitor {
    pub fn new(initial: NetworkState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a new path state. Returns false when it equals the last one.
    pub fn update(&self, state: NetworkState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!("network changed: {:?}", *self.tx.borrow());
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.tx.subscribe()
    }
}

impl Connectivity for ConnectivityMonitor {
    fn current_network(&self) -> NetworkState {
        self.tx.borrow().clone()
    }
}
