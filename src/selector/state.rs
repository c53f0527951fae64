//! Selector state and the reprioritization pass.
//!
//! Everything here is synchronous and lock-free; [`super::Selector`] owns a
//! `SelectorState` behind its mutex and calls into it with freshly read
//! [`Inputs`] for each operation.

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::candidate::{CandidateList, CandidateState, ProtocolPort};
use crate::catalog::{Catalog, build_catalog_order};
use crate::config::{ConfigSnapshot, GOOD_PROTOCOL_TTL_MS};
use crate::network::{NetworkState, NetworkType};
use crate::tunnel::TunnelStatus;

/// Collaborator snapshots for one selector operation.
#[derive(Clone, Debug)]
pub struct Inputs {
    pub network: NetworkState,
    pub tunnel_status: TunnelStatus,
    pub tunnel_active: Option<ProtocolPort>,
    /// Pinned pair for the current network, already looked up in the catalog.
    pub network_preferred: Option<ProtocolPort>,
    pub config: ConfigSnapshot,
}

impl Inputs {
    fn next_up(&self) -> CandidateState {
        CandidateState::NextUp {
            countdown_secs: self.config.next_up_countdown_secs,
        }
    }
}

#[derive(Debug, Default)]
pub struct SelectorState {
    pub candidates: CandidateList,
    pub known_good: Option<ProtocolPort>,
    pub known_good_set_at_ms: Option<u64>,
    pub user_override: Option<ProtocolPort>,
    /// Network type seen by the previous pass; `None` until one is observed.
    pub last_network_type: NetworkType,
    /// Pair that last reached `Connected`, per network name.
    pub last_by_network: FxHashMap<String, ProtocolPort>,
    pub last_tunnel_status: TunnelStatus,
}

impl SelectorState {
    pub fn new(catalog: &dyn Catalog) -> Self {
        Self {
            candidates: build_catalog_order(catalog),
            ..Default::default()
        }
    }

    /// Pair at position 0, or the fallback pair for an empty list.
    pub fn head(&self) -> ProtocolPort {
        self.candidates
            .first()
            .map(|e| e.port.clone())
            .unwrap_or_else(ProtocolPort::fallback)
    }

    fn rebuild(&mut self, catalog: &dyn Catalog) {
        self.candidates = build_catalog_order(catalog);
    }

    /// Recompute the candidate order from the current inputs.
    ///
    /// Later promotions win the front position over earlier ones, giving
    /// Connected > Custom > UserOverride > NetworkPreferred > Manual >
    /// KnownGood > catalog order, with failed entries pinned to the tail.
    ///
    /// Returns the pair to connect to when `should_reconnect` is set.
    pub fn reprioritize(
        &mut self,
        catalog: &dyn Catalog,
        inputs: &Inputs,
        should_reset: bool,
        should_reconnect: bool,
    ) -> Option<ProtocolPort> {
        let current_type = inputs.network.network_type;
        if self.last_network_type != NetworkType::None && self.last_network_type != current_type {
            info!(
                "network type changed {} -> {}, resetting candidates",
                self.last_network_type, current_type
            );
            self.known_good = None;
            self.known_good_set_at_ms = None;
            self.user_override = None;
            self.rebuild(catalog);
        }
        self.last_network_type = current_type;

        if should_reset {
            self.rebuild(catalog);
            self.user_override = None;
        }

        // Captured before any promotion can move them off the tail.
        let failed = self.candidates.protocols_where(CandidateState::is_failed);

        for entry in self.candidates.iter_mut() {
            if entry.state.is_connected() || entry.state.is_next_up() {
                entry.state = CandidateState::Normal;
            }
        }

        if let Some(good) = &self.known_good {
            self.candidates.move_to_front(good, CandidateState::Normal);
        }

        if inputs.config.mode.is_manual() {
            debug!("manual protocol: {}", inputs.config.manual);
            self.candidates.move_to_front(&inputs.config.manual, CandidateState::Normal);
        }

        if let Some(preferred) = &inputs.network_preferred {
            self.candidates.move_to_front(preferred, CandidateState::Normal);
        }

        if let Some(user) = &self.user_override {
            self.candidates.move_to_front(user, CandidateState::Normal);
        }

        for port in &failed {
            debug!("failed: {}", port.protocol);
            // Keep whatever port the promotions above may have assigned.
            let current = self
                .candidates
                .get(&port.protocol)
                .map(|e| e.port.clone())
                .unwrap_or_else(|| port.clone());
            self.candidates.move_to_back(&current, CandidateState::Failed);
        }

        if let Some(custom) = &inputs.config.custom_config {
            self.candidates.move_to_front(custom, CandidateState::Normal);
        }

        match (&inputs.tunnel_active, inputs.tunnel_status) {
            (Some(active), TunnelStatus::Connected) if !should_reconnect => {
                self.candidates.move_to_front(active, CandidateState::Connected);
            }
            _ => {
                let next_up = inputs.next_up();
                if let Some(head) = self.candidates.first_mut()
                    && !head.state.is_failed()
                {
                    head.state = next_up;
                }
            }
        }

        debug!("candidates: {}", self.candidates.describe());

        should_reconnect.then(|| self.head())
    }

    /// Mark `port` failed and pin it to the tail.
    pub fn mark_failed(&mut self, port: &ProtocolPort) {
        self.candidates.move_to_back(port, CandidateState::Failed);
    }

    /// Clear both soft overrides, rebuild from the catalog, and re-run the
    /// reprioritization pass.
    pub fn full_reset(&mut self, catalog: &dyn Catalog, inputs: &Inputs) {
        self.user_override = None;
        self.known_good = None;
        self.known_good_set_at_ms = None;
        self.rebuild(catalog);
        self.reprioritize(catalog, inputs, false, false);
    }

    /// Apply a tunnel status transition to the entry markers.
    pub fn apply_tunnel_status(&mut self, status: TunnelStatus, inputs: &Inputs) {
        self.last_tunnel_status = status;
        self.user_override = None;

        match status {
            TunnelStatus::Connected => {
                let promoted = self.candidates.position_where(CandidateState::is_next_up);
                let keep = promoted
                    .or_else(|| self.candidates.position_where(CandidateState::is_connected));
                for (idx, entry) in self.candidates.iter_mut().enumerate() {
                    if Some(idx) == keep {
                        entry.state = CandidateState::Connected;
                    } else if entry.state.is_next_up() || entry.state.is_connected() {
                        entry.state = CandidateState::Normal;
                    }
                }

                let connected = inputs.tunnel_active.clone().or_else(|| {
                    keep.and_then(|idx| self.candidates.iter().nth(idx))
                        .map(|e| e.port.clone())
                });
                if let (Some(name), Some(port)) = (&inputs.network.name, connected) {
                    debug!("remembering {} for network {}", port, name);
                    self.last_by_network.insert(name.clone(), port);
                }
            }
            TunnelStatus::Disconnected => {
                for entry in self.candidates.iter_mut() {
                    if entry.state.is_next_up() || entry.state.is_connected() {
                        entry.state = CandidateState::Normal;
                    }
                }
            }
            _ => {}
        }
    }

    pub fn known_good_expired(&self, now_ms: u64) -> bool {
        match (&self.known_good, self.known_good_set_at_ms) {
            (Some(_), Some(set_at)) => now_ms.saturating_sub(set_at) >= GOOD_PROTOCOL_TTL_MS,
            _ => false,
        }
    }
}
