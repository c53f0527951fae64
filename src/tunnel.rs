//! Tunnel status as reported by the tunnel service.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::candidate::ProtocolPort;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelStatus {
    #[default]
    Invalid,
    Disconnected,
    Connecting,
    Connected,
    Reasserting,
    Disconnecting,
}

impl TunnelStatus {
    /// Statuses for which the tunnel service knows its active pair.
    pub const fn has_active_pair(self) -> bool {
        matches!(self, TunnelStatus::Connected | TunnelStatus::Connecting)
    }
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TunnelStatus::Invalid => "invalid",
            TunnelStatus::Disconnected => "disconnected",
            TunnelStatus::Connecting => "connecting",
            TunnelStatus::Connected => "connected",
            TunnelStatus::Reasserting => "reasserting",
            TunnelStatus::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TunnelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid" => Ok(TunnelStatus::Invalid),
            "disconnected" => Ok(TunnelStatus::Disconnected),
            "connecting" => Ok(TunnelStatus::Connecting),
            "connected" => Ok(TunnelStatus::Connected),
            "reasserting" => Ok(TunnelStatus::Reasserting),
            "disconnecting" => Ok(TunnelStatus::Disconnecting),
            _ => Err(format!("invalid tunnel status '{}'", s)),
        }
    }
}

/// Read side of the tunnel service.
pub trait Tunnel: Send + Sync {
    fn current_status(&self) -> TunnelStatus;

    /// Only meaningful while connecting or connected.
    fn active_protocol_port(&self) -> Option<ProtocolPort>;
}

#[derive(Clone, Debug, Default)]
struct TunnelInfo {
    status: TunnelStatus,
    active: Option<ProtocolPort>,
}

/// Shared, cheaply readable record of the tunnel's last reported state.
#[derive(Clone, Default)]
pub struct TunnelMonitor {
    inner: Arc<RwLock<TunnelInfo>>,
}

impl TunnelMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, status: TunnelStatus, active: Option<ProtocolPort>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.status = status;
        guard.active = active;
    }
}

impl Tunnel for TunnelMonitor {
    fn current_status(&self) -> TunnelStatus {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    fn active_protocol_port(&self) -> Option<ProtocolPort> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if guard.status.has_active_pair() {
            guard.active.clone()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_pair_only_while_up() {
        let tunnel = TunnelMonitor::new();
        let wg = ProtocolPort::new("WireGuard", "443");

        tunnel.update(TunnelStatus::Connected, Some(wg.clone()));
        assert_eq!(tunnel.current_status(), TunnelStatus::Connected);
        assert_eq!(tunnel.active_protocol_port(), Some(wg.clone()));

        tunnel.update(TunnelStatus::Disconnecting, Some(wg));
        assert_eq!(tunnel.active_protocol_port(), None);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "disconnecting".parse::<TunnelStatus>().unwrap(),
            TunnelStatus::Disconnecting
        );
        assert!("up".parse::<TunnelStatus>().is_err());
        assert!(TunnelStatus::Connecting.has_active_pair());
        assert!(!TunnelStatus::Reasserting.has_active_pair());
    }
}
