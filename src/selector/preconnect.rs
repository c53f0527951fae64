//! Candidate choice immediately before a connection attempt.
//!
//! Unlike the failover pass this never reorders the candidate list.

use super::state::{Inputs, SelectorState};
use crate::candidate::ProtocolPort;
use crate::tunnel::TunnelStatus;

/// Circumstances of the attempt about to be made.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreConnectContext {
    /// The attempt is a failover retry or follows a manual protocol change.
    pub is_retry: bool,
}

pub fn pick(state: &SelectorState, inputs: &Inputs, ctx: PreConnectContext) -> ProtocolPort {
    match inputs.tunnel_status {
        TunnelStatus::Disconnecting => return state.head(),
        TunnelStatus::Connected | TunnelStatus::Connecting => {
            if let Some(active) = &inputs.tunnel_active {
                return active.clone();
            }
        }
        _ => {}
    }

    if let Some(custom) = &inputs.config.custom_config {
        return custom.clone();
    }
    if ctx.is_retry {
        return state.head();
    }
    if let Some(preferred) = &inputs.network_preferred {
        return preferred.clone();
    }
    if inputs.config.mode.is_manual() {
        return inputs.config.manual.clone();
    }

    inputs
        .network
        .name
        .as_ref()
        .and_then(|name| state.last_by_network.get(name))
        .cloned()
        .unwrap_or_else(ProtocolPort::fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{IKEV2, STEALTH, TCP, UDP, WIREGUARD};
    use crate::config::DynamicConfig;
    use crate::mode::ConnectionMode;
    use crate::network::{NetworkState, NetworkType};
    use crate::test_helpers::test_catalog;

    fn setup() -> (SelectorState, Inputs) {
        let catalog = test_catalog();
        let mut state = SelectorState::new(&catalog);
        // Head differs from the fallback so the two are distinguishable.
        state.mark_failed(&ProtocolPort::new(WIREGUARD, "443"));
        let inputs = Inputs {
            network: NetworkState::connected(NetworkType::Wifi, Some("cafe")),
            tunnel_status: TunnelStatus::Disconnected,
            tunnel_active: None,
            network_preferred: None,
            config: DynamicConfig::new().snapshot(),
        };
        (state, inputs)
    }

    #[test]
    fn test_disconnecting_uses_head() {
        let (state, mut inputs) = setup();
        inputs.tunnel_status = TunnelStatus::Disconnecting;
        inputs.tunnel_active = Some(ProtocolPort::new(STEALTH, "443"));
        assert_eq!(pick(&state, &inputs, PreConnectContext::default()).protocol, IKEV2);
    }

    #[test]
    fn test_active_tunnel_is_sticky() {
        let (state, mut inputs) = setup();
        inputs.tunnel_status = TunnelStatus::Connecting;
        inputs.tunnel_active = Some(ProtocolPort::new(STEALTH, "443"));
        inputs.config.custom_config = Some(ProtocolPort::new(UDP, "1194"));
        assert_eq!(
            pick(&state, &inputs, PreConnectContext::default()),
            ProtocolPort::new(STEALTH, "443")
        );
    }

    #[test]
    fn test_custom_config_then_retry_then_preferred_then_manual() {
        let (state, mut inputs) = setup();
        inputs.config.custom_config = Some(ProtocolPort::new(UDP, "1194"));
        inputs.network_preferred = Some(ProtocolPort::new(TCP, "443"));
        inputs.config.mode = ConnectionMode::Manual;
        inputs.config.manual = ProtocolPort::new(STEALTH, "80");

        let retry = PreConnectContext { is_retry: true };
        assert_eq!(pick(&state, &inputs, retry).protocol, UDP);

        inputs.config.custom_config = None;
        assert_eq!(pick(&state, &inputs, retry).protocol, IKEV2);
        assert_eq!(pick(&state, &inputs, PreConnectContext::default()).protocol, TCP);

        inputs.network_preferred = None;
        assert_eq!(
            pick(&state, &inputs, PreConnectContext::default()),
            ProtocolPort::new(STEALTH, "80")
        );
    }

    #[test]
    fn test_falls_back_to_last_pair_for_network() {
        let (mut state, inputs) = setup();
        assert_eq!(
            pick(&state, &inputs, PreConnectContext::default()),
            ProtocolPort::fallback()
        );

        state
            .last_by_network
            .insert("cafe".to_string(), ProtocolPort::new(IKEV2, "4500"));
        assert_eq!(
            pick(&state, &inputs, PreConnectContext::default()),
            ProtocolPort::new(IKEV2, "4500")
        );
    }
}
