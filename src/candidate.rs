//! Candidate (protocol, port) pairs and the priority-ordered list the
//! selector reorders.
//!
//! Position 0 of a [`CandidateList`] is always the pair to try next, or the
//! pair the tunnel is currently using. Entries are unique by protocol name;
//! the list only changes membership when it is rebuilt wholesale.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub const WIREGUARD: &str = "WireGuard";
pub const IKEV2: &str = "IKEv2";
pub const UDP: &str = "UDP";
pub const TCP: &str = "TCP";
pub const STEALTH: &str = "Stealth";
pub const WSTUNNEL: &str = "WStunnel";

pub const DEFAULT_PORT: &str = "443";

/// A tunnel protocol together with the port it should be attempted on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolPort {
    pub protocol: String,
    pub port: String,
}

impl ProtocolPort {
    pub fn new(protocol: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            port: port.into(),
        }
    }

    /// The pair used when nothing else is available.
    pub fn fallback() -> Self {
        Self::new(WIREGUARD, DEFAULT_PORT)
    }
}

impl fmt::Display for ProtocolPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.port)
    }
}

/// Display/priority state of a single candidate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CandidateState {
    #[default]
    Normal,
    Connected,
    Failed,
    NextUp { countdown_secs: u32 },
}

impl CandidateState {
    pub const fn is_failed(self) -> bool {
        matches!(self, CandidateState::Failed)
    }

    pub const fn is_connected(self) -> bool {
        matches!(self, CandidateState::Connected)
    }

    pub const fn is_next_up(self) -> bool {
        matches!(self, CandidateState::NextUp { .. })
    }
}

impl fmt::Display for CandidateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateState::Normal => write!(f, "normal"),
            CandidateState::Connected => write!(f, "connected"),
            CandidateState::Failed => write!(f, "failed"),
            CandidateState::NextUp { countdown_secs } => write!(f, "next-up({}s)", countdown_secs),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CandidateEntry {
    pub port: ProtocolPort,
    #[serde(flatten)]
    pub state: CandidateState,
}

impl CandidateEntry {
    pub fn new(port: ProtocolPort) -> Self {
        Self {
            port,
            state: CandidateState::Normal,
        }
    }

    #[inline]
    pub fn protocol(&self) -> &str {
        &self.port.protocol
    }
}

/// Ordered candidate list, unique by protocol name.
///
/// Lists are short (one entry per supported protocol), so lookups are linear
/// scans over an inline buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateList {
    entries: SmallVec<CandidateEntry, 8>,
}

impl CandidateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from pairs in priority order. Later duplicates of a
    /// protocol are dropped.
    pub fn from_ports(ports: impl IntoIterator<Item = ProtocolPort>) -> Self {
        let mut list = Self::new();
        for port in ports {
            if list.position(&port.protocol).is_none() {
                list.entries.push(CandidateEntry::new(port));
            }
        }
        list
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&CandidateEntry> {
        self.entries.first()
    }

    pub fn first_mut(&mut self) -> Option<&mut CandidateEntry> {
        self.entries.first_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidateEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CandidateEntry> {
        self.entries.iter_mut()
    }

    pub fn position(&self, protocol: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.protocol() == protocol)
    }

    pub fn get(&self, protocol: &str) -> Option<&CandidateEntry> {
        self.entries.iter().find(|e| e.protocol() == protocol)
    }

    pub fn get_mut(&mut self, protocol: &str) -> Option<&mut CandidateEntry> {
        self.entries.iter_mut().find(|e| e.protocol() == protocol)
    }

    /// Overwrite the port of an existing entry without moving it.
    pub fn set_port(&mut self, port: &ProtocolPort) {
        if let Some(entry) = self.get_mut(&port.protocol) {
            entry.port.port.clone_from(&port.port);
        }
    }

    /// Move `port` to index 0 with `state`, inserting it when absent.
    pub fn move_to_front(&mut self, port: &ProtocolPort, state: CandidateState) {
        let mut entry = self.take(port);
        entry.state = state;
        self.entries.insert(0, entry);
    }

    /// Move `port` to the tail with `state`, inserting it when absent.
    pub fn move_to_back(&mut self, port: &ProtocolPort, state: CandidateState) {
        let mut entry = self.take(port);
        entry.state = state;
        self.entries.push(entry);
    }

    fn take(&mut self, port: &ProtocolPort) -> CandidateEntry {
        match self.position(&port.protocol) {
            Some(idx) => {
                let mut entry = self.entries.remove(idx);
                entry.port.port.clone_from(&port.port);
                entry
            }
            None => CandidateEntry::new(port.clone()),
        }
    }

    /// Pairs of all entries whose state matches `pred`, in list order.
    pub fn protocols_where(&self, pred: impl Fn(CandidateState) -> bool) -> Vec<ProtocolPort> {
        self.entries
            .iter()
            .filter(|e| pred(e.state))
            .map(|e| e.port.clone())
            .collect()
    }

    pub fn position_where(&self, pred: impl Fn(CandidateState) -> bool) -> Option<usize> {
        self.entries.iter().position(|e| pred(e.state))
    }

    pub fn count_where(&self, pred: impl Fn(CandidateState) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(e.state)).count()
    }

    pub fn all_failed(&self) -> bool {
        self.entries.iter().all(|e| e.state.is_failed())
    }

    pub fn to_vec(&self) -> Vec<CandidateEntry> {
        self.entries.to_vec()
    }

    /// One-line rendering used in debug logs.
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} {}", e.port, e.state))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> CandidateList {
        CandidateList::from_ports([
            ProtocolPort::new(WIREGUARD, "443"),
            ProtocolPort::new(IKEV2, "500"),
            ProtocolPort::new(STEALTH, "443"),
        ])
    }

    fn order(list: &CandidateList) -> Vec<&str> {
        list.iter().map(|e| e.protocol()).collect()
    }

    #[test]
    fn test_from_ports_dedups_by_protocol() {
        let list = CandidateList::from_ports([
            ProtocolPort::new(WIREGUARD, "443"),
            ProtocolPort::new(WIREGUARD, "51820"),
            ProtocolPort::new(IKEV2, "500"),
        ]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(WIREGUARD).unwrap().port.port, "443");
    }

    #[test]
    fn test_move_to_front_updates_port_and_state() {
        let mut list = list();
        list.move_to_front(&ProtocolPort::new(STEALTH, "80"), CandidateState::Connected);

        assert_eq!(order(&list), vec![STEALTH, WIREGUARD, IKEV2]);
        let head = list.first().unwrap();
        assert_eq!(head.port.port, "80");
        assert_eq!(head.state, CandidateState::Connected);
    }

    #[test]
    fn test_move_to_front_inserts_missing_entry() {
        let mut list = list();
        list.move_to_front(&ProtocolPort::new(TCP, "1194"), CandidateState::Normal);
        assert_eq!(list.len(), 4);
        assert_eq!(list.first().unwrap().protocol(), TCP);
    }

    #[test]
    fn test_move_to_back() {
        let mut list = list();
        list.move_to_back(&ProtocolPort::new(WIREGUARD, "443"), CandidateState::Failed);
        assert_eq!(order(&list), vec![IKEV2, STEALTH, WIREGUARD]);
        assert!(list.get(WIREGUARD).unwrap().state.is_failed());
        assert!(!list.all_failed());
    }

    #[test]
    fn test_set_port_keeps_position() {
        let mut list = list();
        list.set_port(&ProtocolPort::new(IKEV2, "4500"));
        assert_eq!(order(&list), vec![WIREGUARD, IKEV2, STEALTH]);
        assert_eq!(list.get(IKEV2).unwrap().port.port, "4500");

        // Unknown protocols are ignored.
        list.set_port(&ProtocolPort::new(UDP, "53"));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_all_failed_on_empty_list() {
        assert!(CandidateList::new().all_failed());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            format!("{}", CandidateState::NextUp { countdown_secs: 10 }),
            "next-up(10s)"
        );
        assert_eq!(format!("{}", ProtocolPort::fallback()), "WireGuard:443");
    }
}
