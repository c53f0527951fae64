//! Protocol Failover Library
//!
//! This library decides which VPN protocol/port pair a client should try
//! next. It keeps an ordered candidate list, demotes pairs that fail,
//! honors manual, per-network, user and custom-config overrides, and
//! remembers a known-good pair for twelve hours.

// Use mimalloc as the global allocator for tests (non-Windows only)
#[cfg(not(windows))]
#[cfg(test)]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod candidate;
pub mod catalog;
pub mod config;
pub mod control;
pub mod mode;
pub mod network;
pub mod report;
pub mod scheduler;
pub mod selector;
pub mod tunnel;
pub mod utils;

// Test helpers module - available when test-internals feature is enabled
#[cfg(any(test, feature = "test-internals"))]
pub mod test_helpers;

#[cfg(test)]
pub mod tests;

// Re-export commonly used items
pub use candidate::{CandidateEntry, CandidateList, CandidateState, ProtocolPort};
pub use catalog::{Catalog, StaticCatalog};
pub use config::DynamicConfig;
pub use mode::ConnectionMode;
pub use network::{Connectivity, ConnectivityMonitor, NetworkState, NetworkStatus, NetworkType};
pub use scheduler::ResetScheduler;
pub use selector::{CandidateSignal, PreConnectContext, Selector, SignalOrigin};
pub use tunnel::{Tunnel, TunnelMonitor, TunnelStatus};
pub use utils::now_ms;
