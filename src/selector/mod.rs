//! Protocol/port failover selector.
//!
//! The [`Selector`] owns the candidate list and decides which (protocol,
//! port) pair the next connection attempt should use. It is called from UI
//! actions, tunnel status callbacks, the network monitor and the expiry
//! timer; every operation runs as one critical section over the shared
//! state, and publishes its outcome on a latest-value watch channel while
//! still holding the lock, so subscribers never see an older decision after
//! a newer one.
//!
//! Collaborators are read through cheap synchronous snapshots taken inside
//! the critical section; the selector itself never awaits. Collaborators
//! must not call back into the selector while answering a read.

mod preconnect;
mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info};

pub use preconnect::PreConnectContext;
use state::{Inputs, SelectorState};

use crate::candidate::{CandidateEntry, CandidateState, ProtocolPort};
use crate::catalog::Catalog;
use crate::config::DynamicConfig;
use crate::network::Connectivity;
use crate::report::SelectorReport;
use crate::tunnel::{Tunnel, TunnelStatus};
use crate::utils::now_ms;

/// What produced a [`CandidateSignal`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SignalOrigin {
    #[default]
    Refresh,
    Reconnect,
    UserSelect,
    Failover,
    Exhausted,
    Expiry,
    Tunnel,
}

/// Latest selector decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateSignal {
    /// Monotonic, bumped on every publish.
    pub seq: u64,
    /// Pair at position 0 after the operation.
    pub top: ProtocolPort,
    /// Set when the caller should (re)connect with this pair; `None` for
    /// display-only refreshes.
    pub connect: Option<ProtocolPort>,
    pub origin: SignalOrigin,
}

impl Default for CandidateSignal {
    fn default() -> Self {
        Self {
            seq: 0,
            top: ProtocolPort::fallback(),
            connect: None,
            origin: SignalOrigin::default(),
        }
    }
}

pub struct Selector {
    state: Mutex<SelectorState>,
    catalog: Arc<dyn Catalog>,
    connectivity: Arc<dyn Connectivity>,
    tunnel: Arc<dyn Tunnel>,
    config: DynamicConfig,
    signal: watch::Sender<CandidateSignal>,
}

impl Selector {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        connectivity: Arc<dyn Connectivity>,
        tunnel: Arc<dyn Tunnel>,
        config: DynamicConfig,
    ) -> Self {
        info!("starting protocol selector");
        let (signal, _rx) = watch::channel(CandidateSignal::default());
        let selector = Self {
            state: Mutex::new(SelectorState::new(catalog.as_ref())),
            catalog,
            connectivity,
            tunnel,
            config,
            signal,
        };
        selector.reprioritize(true, false);
        selector
    }

    /// A poisoned lock still holds a usable list; the next pass normalizes
    /// any half-applied markers.
    fn lock(&self) -> MutexGuard<'_, SelectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Must be called with the state lock held, so that a pass never
    /// commits an observation older than the one before it.
    fn inputs(&self) -> Inputs {
        let network = self.connectivity.current_network();
        let network_preferred = network
            .name
            .as_deref()
            .and_then(|name| self.catalog.preferred_protocol_for(name));
        Inputs {
            network,
            tunnel_status: self.tunnel.current_status(),
            tunnel_active: self.tunnel.active_protocol_port(),
            network_preferred,
            config: self.config.snapshot(),
        }
    }

    /// Must be called with the state lock held.
    fn publish(&self, state: &SelectorState, connect: Option<ProtocolPort>, origin: SignalOrigin) {
        let top = state.head();
        self.signal.send_modify(|signal| {
            signal.seq += 1;
            signal.top = top;
            signal.connect = connect;
            signal.origin = origin;
        });
    }

    /// Recompute the candidate order from current inputs and publish the
    /// head. With `should_reconnect` the head is published as a pair to
    /// connect to; otherwise the signal is a display refresh.
    pub fn reprioritize(&self, should_reset: bool, should_reconnect: bool) {
        let mut state = self.lock();
        let inputs = self.inputs();
        let connect = state.reprioritize(
            self.catalog.as_ref(),
            &inputs,
            should_reset,
            should_reconnect,
        );
        let origin = if connect.is_some() {
            SignalOrigin::Reconnect
        } else {
            SignalOrigin::Refresh
        };
        self.publish(&state, connect, origin);
    }

    /// Reprioritize (without reconnect) and return the pair to try next.
    pub fn get_next_candidate(&self, should_reset: bool) -> ProtocolPort {
        let mut state = self.lock();
        let inputs = self.inputs();
        state.reprioritize(self.catalog.as_ref(), &inputs, should_reset, false);
        self.publish(&state, None, SignalOrigin::Refresh);
        state.head()
    }

    /// Display refresh used when connectivity or preferences change.
    pub fn refresh(&self) -> Vec<CandidateEntry> {
        let mut state = self.lock();
        let inputs = self.inputs();
        state.reprioritize(self.catalog.as_ref(), &inputs, false, false);
        self.publish(&state, None, SignalOrigin::Refresh);
        state.candidates.to_vec()
    }

    /// The pair just attempted failed. Demotes it and returns `true` when
    /// every candidate has now failed; the list is then reset to catalog
    /// order so the next cycle starts clean.
    pub fn on_connection_failed(&self) -> bool {
        let mut state = self.lock();
        let inputs = self.inputs();
        state.user_override = None;

        // The head after a pass is the pair that was being attempted.
        state.reprioritize(self.catalog.as_ref(), &inputs, false, false);
        let failed = state.head();
        info!("{} failed to connect", failed.protocol);
        state.mark_failed(&failed);

        if state.candidates.all_failed() {
            info!("no more protocols left to connect, resetting");
            state.full_reset(self.catalog.as_ref(), &inputs);
            self.publish(&state, None, SignalOrigin::Exhausted);
            return true;
        }

        self.publish(&state, None, SignalOrigin::Failover);
        false
    }

    /// Prefer `port` for the next attempt.
    pub fn on_user_select(&self, port: ProtocolPort) {
        info!("user selected {} to connect", port);
        let mut state = self.lock();
        let inputs = self.inputs();
        // An explicit choice outranks this cycle's failure mark.
        if let Some(entry) = state.candidates.get_mut(&port.protocol)
            && entry.state.is_failed()
        {
            entry.state = CandidateState::Normal;
        }
        state.user_override = Some(port.clone());
        state.reprioritize(self.catalog.as_ref(), &inputs, false, false);
        // While a tunnel is up the head stays on the connected pair; the
        // selection itself is what the caller should switch to.
        self.publish(&state, Some(port), SignalOrigin::UserSelect);
    }

    pub fn on_tunnel_status_changed(&self, status: TunnelStatus) {
        info!("connection state changed to {}", status);
        let mut state = self.lock();
        let inputs = self.inputs();
        state.apply_tunnel_status(status, &inputs);
        if matches!(status, TunnelStatus::Connected | TunnelStatus::Disconnected) {
            self.publish(&state, None, SignalOrigin::Tunnel);
        }
    }

    /// External success signal: remember `port` as known good from now.
    pub fn record_good_protocol(&self, port: ProtocolPort) {
        self.record_good_protocol_at(port, now_ms());
    }

    pub fn record_good_protocol_at(&self, port: ProtocolPort, at_ms: u64) {
        debug!("good protocol: {}", port);
        let mut state = self.lock();
        state.known_good = Some(port);
        state.known_good_set_at_ms = Some(at_ms);
    }

    /// Hourly check. Returns `true` when the known-good protocol expired and
    /// the list was reset; the caller stops ticking until re-armed.
    pub fn on_good_protocol_expiry_check(&self) -> bool {
        self.on_good_protocol_expiry_check_at(now_ms())
    }

    pub fn on_good_protocol_expiry_check_at(&self, now_ms: u64) -> bool {
        let mut state = self.lock();
        let inputs = self.inputs();
        if !state.known_good_expired(now_ms) {
            return false;
        }
        info!("resetting good protocol after 12 hours");
        state.full_reset(self.catalog.as_ref(), &inputs);
        self.publish(&state, None, SignalOrigin::Expiry);
        true
    }

    /// Pair to use for a connection about to start. Read-only.
    pub fn pick_pre_connect_candidate(&self, ctx: PreConnectContext) -> ProtocolPort {
        let state = self.lock();
        let inputs = self.inputs();
        preconnect::pick(&state, &inputs, ctx)
    }

    /// Immutable copy of the list for the protocol-switch view.
    pub fn snapshot_for_display(&self) -> Vec<CandidateEntry> {
        self.lock().candidates.to_vec()
    }

    pub fn subscribe(&self) -> watch::Receiver<CandidateSignal> {
        self.signal.subscribe()
    }

    pub fn current_signal(&self) -> CandidateSignal {
        self.signal.borrow().clone()
    }

    pub fn known_good(&self) -> Option<ProtocolPort> {
        self.lock().known_good.clone()
    }

    pub fn user_override(&self) -> Option<ProtocolPort> {
        self.lock().user_override.clone()
    }

    pub fn status_report(&self) -> SelectorReport {
        let state = self.lock();
        let config = self.config.snapshot();
        SelectorReport::build(
            &state.candidates,
            state.known_good.as_ref(),
            state.known_good_set_at_ms,
            state.user_override.as_ref(),
            state.last_tunnel_status,
            &config,
            self.signal.borrow().seq,
        )
    }
}
