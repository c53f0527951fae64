//! Status report for external consumers.
//!
//! Exported as JSON by the control channel's `status` command so a UI or
//! script can render the protocol-switch view without touching selector
//! internals. Values are copied out of the selector under its lock; nothing
//! here is derived beyond simple counts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::candidate::{CandidateEntry, CandidateList, CandidateState, ProtocolPort};
use crate::config::{ConfigSnapshot, GOOD_PROTOCOL_TTL_MS};
use crate::tunnel::TunnelStatus;
use crate::utils::ms_to_utc;

#[derive(Clone, Debug, Serialize)]
pub struct KnownGoodReport {
    pub pair: ProtocolPort,
    pub set_at: Option<DateTime<Utc>>,
    /// When the hourly check will first consider it expired.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SelectorReport {
    /// "auto" or "manual"
    pub mode: String,
    pub manual: ProtocolPort,
    pub custom_config: Option<ProtocolPort>,
    pub tunnel: TunnelStatus,
    pub known_good: Option<KnownGoodReport>,
    pub user_override: Option<ProtocolPort>,
    /// Sequence number of the last published candidate signal.
    pub signal_seq: u64,
    pub failed: usize,
    pub candidates: Vec<CandidateEntry>,
}

impl SelectorReport {
    pub(crate) fn build(
        candidates: &CandidateList,
        known_good: Option<&ProtocolPort>,
        known_good_set_at_ms: Option<u64>,
        user_override: Option<&ProtocolPort>,
        tunnel: TunnelStatus,
        config: &ConfigSnapshot,
        signal_seq: u64,
    ) -> Self {
        let known_good = known_good.map(|pair| KnownGoodReport {
            pair: pair.clone(),
            set_at: known_good_set_at_ms.and_then(ms_to_utc),
            expires_at: known_good_set_at_ms
                .and_then(|ms| ms_to_utc(ms.saturating_add(GOOD_PROTOCOL_TTL_MS))),
        });

        Self {
            mode: config.mode.to_string(),
            manual: config.manual.clone(),
            custom_config: config.custom_config.clone(),
            tunnel,
            known_good,
            user_override: user_override.cloned(),
            signal_seq,
            failed: candidates.count_where(CandidateState::is_failed),
            candidates: candidates.to_vec(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
