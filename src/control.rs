//! Runtime control channel for the selector daemon.
//!
//! Line-based commands arrive on stdin, or on a Unix domain socket when one
//! is configured. They drive the in-memory collaborators (network, tunnel,
//! catalog) and the selector operations, so the failover behavior can be
//! exercised by hand or from scripts:
//!
//! ```text
//! echo 'fail' | socat - UNIX-CONNECT:/tmp/failover.sock
//! ```

use std::sync::Arc;
use std::time::Duration;

#[cfg(unix)]
use tokio::io::AsyncWriteExt;
use tokio::io::{AsyncBufReadExt, BufReader};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
#[cfg(unix)]
use tracing::debug;
use tracing::{info, warn};

use crate::candidate::ProtocolPort;
use crate::catalog::StaticCatalog;
use crate::config::{self, DynamicConfig};
use crate::network::{Connectivity, ConnectivityMonitor, NetworkState, NetworkStatus, NetworkType};
use crate::scheduler::ResetScheduler;
use crate::selector::{PreConnectContext, Selector};
use crate::tunnel::{Tunnel, TunnelMonitor, TunnelStatus};

/// Handles shared by every control client.
#[derive(Clone)]
pub struct Control {
    pub selector: Arc<Selector>,
    pub scheduler: Arc<ResetScheduler>,
    pub config: DynamicConfig,
    pub catalog: Arc<StaticCatalog>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub tunnel: TunnelMonitor,
}

fn pair(protocol: &str, port: &str) -> ProtocolPort {
    ProtocolPort::new(protocol, port)
}

impl Control {
    /// Apply one command line. Returns the reply to send back, if any.
    ///
    /// Commands:
    /// - `network none|wifi|cellular [name]` - report a new network path
    /// - `network-status connected|disconnected|requires-reconnect`
    /// - `tunnel <status> [protocol port]` - report a tunnel status change
    /// - `fail` - the current attempt failed
    /// - `select <protocol> <port>` - user picked a protocol
    /// - `good <protocol> <port>` - remember a known-good protocol
    /// - `next` / `reconnect` / `refresh [reset]`
    /// - `prefer <network> <protocol> <port>` / `prefer <network> off`
    /// - `preconnect [retry]`
    /// - `status` - JSON report
    /// - any command understood by [`config::apply_cmd`]
    pub fn apply_cmd(&self, cmd: &str) -> Option<String> {
        let cmd = cmd.trim();
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        let &head = parts.first()?;

        match (head, &parts[1..]) {
            ("network", [kind, rest @ ..]) => {
                let network_type = match kind.parse::<NetworkType>() {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("{}", e);
                        return Some(e);
                    }
                };
                let status = if network_type == NetworkType::None {
                    NetworkStatus::Disconnected
                } else {
                    NetworkStatus::Connected
                };
                let state = NetworkState {
                    network_type,
                    status,
                    name: rest.first().map(|s| s.to_string()),
                    is_tunnel_active: self.tunnel.current_status() == TunnelStatus::Connected,
                };
                let changed = self.connectivity.update(state);
                Some(if changed { "ok" } else { "unchanged" }.to_string())
            }

            ("network-status", [status]) => match status.parse::<NetworkStatus>() {
                Ok(status) => {
                    let mut state = self.connectivity.current_network();
                    state.status = status;
                    self.connectivity.update(state);
                    Some("ok".to_string())
                }
                Err(e) => {
                    warn!("{}", e);
                    Some(e)
                }
            },

            ("tunnel", [status, rest @ ..]) => {
                let status = match status.parse::<TunnelStatus>() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("{}", e);
                        return Some(e);
                    }
                };
                let active = match rest {
                    [protocol, port] => Some(pair(protocol, port)),
                    _ => self.tunnel.active_protocol_port(),
                };
                self.tunnel.update(status, active.clone());
                self.selector.on_tunnel_status_changed(status);
                if status == TunnelStatus::Connected
                    && let Some(active) = active
                {
                    self.selector.record_good_protocol(active);
                    self.scheduler.arm();
                }
                Some("ok".to_string())
            }

            ("fail", []) => {
                if self.selector.on_connection_failed() {
                    Some("exhausted".to_string())
                } else {
                    Some(format!("next {}", self.selector.current_signal().top))
                }
            }

            ("select", [protocol, port]) => {
                self.selector.on_user_select(pair(protocol, port));
                Some(format!("next {}", self.selector.current_signal().top))
            }

            ("good", [protocol, port]) => {
                self.selector.record_good_protocol(pair(protocol, port));
                self.scheduler.arm();
                Some("ok".to_string())
            }

            ("next", []) => Some(self.selector.get_next_candidate(false).to_string()),

            ("reconnect", []) => {
                self.selector.reprioritize(false, true);
                Some(format!("connect {}", self.selector.current_signal().top))
            }

            ("refresh", rest) => {
                let reset = matches!(rest, ["reset"]);
                self.selector.reprioritize(reset, false);
                Some(format!("next {}", self.selector.current_signal().top))
            }

            ("prefer", [network, "off"]) => {
                self.catalog.set_preferred(network, None);
                self.selector.refresh();
                Some("ok".to_string())
            }

            ("prefer", [network, protocol, port]) => {
                self.catalog.set_preferred(network, Some(pair(protocol, port)));
                self.selector.refresh();
                Some("ok".to_string())
            }

            ("preconnect", rest) => {
                let ctx = PreConnectContext {
                    is_retry: matches!(rest, ["retry"]),
                };
                Some(self.selector.pick_pre_connect_candidate(ctx).to_string())
            }

            ("status", []) => Some(self.selector.status_report().to_json()),

            _ => {
                if config::apply_cmd(&self.config, cmd) {
                    self.selector.refresh();
                    Some("ok".to_string())
                } else {
                    warn!("unknown command: {}", cmd);
                    Some(format!("unknown command: {}", cmd))
                }
            }
        }
    }
}

/// Refresh the list once network changes settle for `debounce`; reconnect
/// when the path asks for it.
pub fn spawn_network_watcher(
    connectivity: &ConnectivityMonitor,
    selector: Arc<Selector>,
    debounce: Duration,
) -> JoinHandle<()> {
    let mut changes = connectivity.subscribe();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            tokio::time::sleep(debounce).await;
            let network = changes.borrow_and_update().clone();
            info!(
                "network changed: {} {:?} ({})",
                network.network_type,
                network.status,
                network.name.as_deref().unwrap_or("unnamed")
            );
            if network.status == NetworkStatus::RequiresReconnect {
                selector.reprioritize(false, true);
            } else {
                selector.refresh();
            }
        }
    })
}

pub fn spawn_control_listener(control: Control, socket_path: Option<String>) {
    match socket_path {
        None => {
            tokio::spawn(stdin_loop(control));
        }
        #[cfg(unix)]
        Some(path) => {
            tokio::spawn(unix_socket_loop(control, path));
        }
        #[cfg(not(unix))]
        Some(path) => {
            warn!("control socket {} is not supported on this platform", path);
        }
    }
}

async fn stdin_loop(control: Control) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(reply) = control.apply_cmd(&line) {
            println!("{}", reply);
        }
    }
}

#[cfg(unix)]
async fn unix_socket_loop(control: Control, socket_path: String) {
    // Remove a stale socket file from a previous run
    let _ = std::fs::remove_file(&socket_path);

    let listener = match UnixListener::bind(&socket_path) {
        Ok(l) => l,
        Err(e) => {
            warn!("failed to bind unix socket {}: {}", socket_path, e);
            return;
        }
    };

    info!("unix socket listening at: {}", socket_path);

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(handle_unix_client(control.clone(), stream));
            }
            Err(e) => {
                debug!("unix socket accept error: {}", e);
            }
        }
    }
}

#[cfg(unix)]
async fn handle_unix_client(control: Control, stream: UnixStream) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(reply) = control.apply_cmd(&line) {
            if writer.write_all(reply.as_bytes()).await.is_err()
                || writer.write_all(b"\n").await.is_err()
            {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time;

    use super::*;
    use crate::config::NETWORK_DEBOUNCE_MS;
    use crate::selector::SignalOrigin;
    use crate::test_helpers::TestHarness;

    fn control(harness: &TestHarness) -> Control {
        Control {
            selector: harness.selector.clone(),
            scheduler: Arc::new(ResetScheduler::new(harness.selector.clone())),
            config: harness.config.clone(),
            catalog: harness.catalog.clone(),
            connectivity: harness.connectivity.clone(),
            tunnel: harness.tunnel.clone(),
        }
    }

    #[tokio::test]
    async fn test_fail_commands_walk_the_list() {
        let harness = TestHarness::new();
        let control = control(&harness);

        assert_eq!(control.apply_cmd("fail").as_deref(), Some("next IKEv2:500"));
        assert_eq!(control.apply_cmd("next").as_deref(), Some("IKEv2:500"));
        assert_eq!(control.apply_cmd("fail").as_deref(), Some("next Stealth:443"));
        assert_eq!(control.apply_cmd("fail").as_deref(), Some("exhausted"));
        assert_eq!(control.apply_cmd("next").as_deref(), Some("WireGuard:443"));
    }

    #[tokio::test]
    async fn test_tunnel_connected_records_good_protocol() {
        let harness = TestHarness::new();
        let control = control(&harness);

        control.apply_cmd("tunnel connecting Stealth 443");
        control.apply_cmd("tunnel connected Stealth 443");

        assert_eq!(
            harness.selector.known_good(),
            Some(ProtocolPort::new("Stealth", "443"))
        );
        assert!(control.scheduler.is_armed());
        assert_eq!(control.apply_cmd("preconnect").as_deref(), Some("Stealth:443"));
        control.scheduler.disarm();
    }

    #[tokio::test]
    async fn test_config_and_prefer_commands_refresh_the_list() {
        let harness = TestHarness::new();
        let control = control(&harness);

        assert_eq!(control.apply_cmd("manual Stealth 443").as_deref(), Some("ok"));
        assert_eq!(control.apply_cmd("mode manual").as_deref(), Some("ok"));
        assert_eq!(harness.order()[0], "Stealth");

        control.apply_cmd("prefer home IKEv2 4500");
        assert_eq!(control.apply_cmd("next").as_deref(), Some("IKEv2:4500"));

        control.apply_cmd("prefer home off");
        assert_eq!(control.apply_cmd("next").as_deref(), Some("Stealth:443"));
    }

    #[tokio::test]
    async fn test_status_and_unknown() {
        let harness = TestHarness::new();
        let control = control(&harness);

        let status = control.apply_cmd("status").unwrap();
        assert!(status.contains("\"candidates\""));
        assert!(control.apply_cmd("").is_none());
        assert!(control.apply_cmd("launch rockets").unwrap().starts_with("unknown"));
        assert!(control.apply_cmd("network ethernet").unwrap().contains("invalid"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_watcher_debounces_changes() {
        let harness = TestHarness::new();
        let watcher = spawn_network_watcher(
            &harness.connectivity,
            harness.selector.clone(),
            Duration::from_millis(NETWORK_DEBOUNCE_MS),
        );
        let before = harness.selector.current_signal().seq;

        // Two changes inside one quiet period produce a single refresh.
        let cellular = NetworkState::connected(NetworkType::Cellular, None);
        harness.connectivity.update(cellular);
        time::sleep(Duration::from_millis(100)).await;
        let carrier = NetworkState::connected(NetworkType::Cellular, Some("carrier"));
        harness.connectivity.update(carrier);
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(harness.selector.current_signal().seq, before + 1);
        assert_eq!(harness.order()[0], "WireGuard");

        let mut network = harness.connectivity.current_network();
        network.status = NetworkStatus::RequiresReconnect;
        harness.connectivity.update(network);
        time::sleep(Duration::from_secs(1)).await;

        let signal = harness.selector.current_signal();
        assert_eq!(signal.seq, before + 2);
        assert_eq!(signal.origin, SignalOrigin::Reconnect);
        watcher.abort();
    }
}
