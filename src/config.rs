//! Runtime configuration for the selector.
//!
//! Holds the persisted connection preferences (mode, manual pair, selected
//! custom configuration) that the selector reads as inputs. Values can be
//! changed at runtime via the control channel.

use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use crate::candidate::ProtocolPort;
use crate::mode::ConnectionMode;
use crate::utils::MS_PER_HOUR;

/// A known-good protocol is forgotten after 12 hours.
pub const GOOD_PROTOCOL_TTL_MS: u64 = 12 * MS_PER_HOUR;

/// Period of the good-protocol expiry check.
pub const EXPIRY_TICK_MS: u64 = MS_PER_HOUR;

/// Quiet period after a network change before the list is refreshed.
pub const NETWORK_DEBOUNCE_MS: u64 = 500;

/// Seconds shown on the next-up candidate before the next automatic attempt.
pub const DEFAULT_NEXT_UP_COUNTDOWN_SECS: u32 = 10;

/// Snapshot of configuration, read once per selector operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub mode: ConnectionMode,
    pub manual: ProtocolPort,
    /// Fixed pair of the selected custom/imported configuration, if any.
    pub custom_config: Option<ProtocolPort>,
    pub next_up_countdown_secs: u32,
}

/// Dynamic configuration that can be modified at runtime.
/// Scalars are atomics; the string-valued pairs sit behind `RwLock`s.
#[derive(Clone)]
pub struct DynamicConfig {
    mode: Arc<AtomicU8>,
    manual: Arc<RwLock<ProtocolPort>>,
    custom_config: Arc<RwLock<Option<ProtocolPort>>>,
    next_up_countdown_secs: Arc<AtomicU32>,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicConfig {
    pub fn new() -> Self {
        Self::from_cli(ConnectionMode::Auto, ProtocolPort::fallback())
    }

    /// Create config from CLI arguments.
    pub fn from_cli(mode: ConnectionMode, manual: ProtocolPort) -> Self {
        Self {
            mode: Arc::new(AtomicU8::new(mode.as_u8())),
            manual: Arc::new(RwLock::new(manual)),
            custom_config: Arc::new(RwLock::new(None)),
            next_up_countdown_secs: Arc::new(AtomicU32::new(DEFAULT_NEXT_UP_COUNTDOWN_SECS)),
        }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            mode: self.mode(),
            manual: self
                .manual
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            custom_config: self
                .custom_config
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            next_up_countdown_secs: self.next_up_countdown_secs.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn mode(&self) -> ConnectionMode {
        ConnectionMode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    pub fn set_mode(&self, mode: ConnectionMode) {
        self.mode.store(mode.as_u8(), Ordering::Relaxed);
    }

    pub fn set_manual(&self, manual: ProtocolPort) {
        *self.manual.write().unwrap_or_else(PoisonError::into_inner) = manual;
    }

    pub fn set_custom_config(&self, custom: Option<ProtocolPort>) {
        *self
            .custom_config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = custom;
    }

    pub fn set_next_up_countdown_secs(&self, secs: u32) {
        self.next_up_countdown_secs.store(secs, Ordering::Relaxed);
    }
}

/// Apply a configuration command. Returns false when `cmd` is not a
/// configuration command, so callers can try other handlers.
///
/// Commands:
/// - `mode auto|manual` - switch connection mode
/// - `manual <protocol> <port>` - set the manual pair
/// - `custom <protocol> <port>` / `custom off` - select or clear a custom config
/// - `countdown <secs>` - set the next-up countdown
pub fn apply_cmd(config: &DynamicConfig, cmd: &str) -> bool {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    let Some(&head) = parts.first() else {
        return false;
    };

    match head {
        "mode" => {
            match parts.get(1).map(|m| m.parse::<ConnectionMode>()) {
                Some(Ok(mode)) if parts.len() == 2 => {
                    config.set_mode(mode);
                    info!("mode: {}", mode);
                }
                Some(Err(e)) => warn!("{}", e),
                _ => warn!("usage: mode auto|manual"),
            }
            true
        }

        "manual" => {
            if let [_, protocol, port] = parts.as_slice() {
                let pair = ProtocolPort::new(*protocol, *port);
                info!("manual: {}", pair);
                config.set_manual(pair);
            } else {
                warn!("usage: manual <protocol> <port>");
            }
            true
        }

        "custom" => {
            match parts.as_slice() {
                [_, "off"] => {
                    config.set_custom_config(None);
                    info!("custom config: off");
                }
                [_, protocol, port] => {
                    let pair = ProtocolPort::new(*protocol, *port);
                    info!("custom config: {}", pair);
                    config.set_custom_config(Some(pair));
                }
                _ => warn!("usage: custom <protocol> <port>|off"),
            }
            true
        }

        "countdown" => {
            match parts.get(1).map(|s| s.parse::<u32>()) {
                Some(Ok(secs)) => {
                    config.set_next_up_countdown_secs(secs);
                    info!("countdown: {}s", secs);
                }
                _ => warn!("usage: countdown <secs>"),
            }
            true
        }

        _ => false,
    }
}
