//! Connection mode enum for protocol selection.

use std::fmt;

/// How the protocol for the next connection attempt is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Auto mode (default): catalog order, reshuffled by failures,
    /// overrides and per-network preferences.
    #[default]
    Auto,

    /// Manual mode: the user's configured protocol/port is promoted ahead
    /// of the catalog order (but still behind network preferences and
    /// explicit selections).
    Manual,
}

impl ConnectionMode {
    /// Convert to u8 for atomic storage.
    pub const fn as_u8(self) -> u8 {
        match self {
            ConnectionMode::Auto => 0,
            ConnectionMode::Manual => 1,
        }
    }

    /// Convert from u8, defaulting to Auto for invalid values.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionMode::Manual,
            _ => ConnectionMode::Auto,
        }
    }

    pub const fn is_manual(self) -> bool {
        matches!(self, ConnectionMode::Manual)
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Auto => write!(f, "auto"),
            ConnectionMode::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for ConnectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ConnectionMode::Auto),
            "manual" => Ok(ConnectionMode::Manual),
            _ => Err(format!("invalid mode '{}': use auto or manual", s)),
        }
    }
}

impl clap::ValueEnum for ConnectionMode {
    fn value_variants<'a>() -> &'a [Self] {
        &[ConnectionMode::Auto, ConnectionMode::Manual]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            ConnectionMode::Auto => Some(clap::builder::PossibleValue::new("auto")),
            ConnectionMode::Manual => Some(clap::builder::PossibleValue::new("manual")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_default() {
        assert_eq!(ConnectionMode::default(), ConnectionMode::Auto);
    }

    #[test]
    fn test_mode_u8() {
        assert_eq!(ConnectionMode::from_u8(ConnectionMode::Manual.as_u8()), ConnectionMode::Manual);
        assert_eq!(ConnectionMode::from_u8(ConnectionMode::Auto.as_u8()), ConnectionMode::Auto);
        assert_eq!(ConnectionMode::from_u8(42), ConnectionMode::Auto);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("auto".parse::<ConnectionMode>().unwrap(), ConnectionMode::Auto);
        assert_eq!("manual".parse::<ConnectionMode>().unwrap(), ConnectionMode::Manual);
        assert!("Manual".parse::<ConnectionMode>().is_err());
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(format!("{}", ConnectionMode::Auto), "auto");
        assert_eq!(format!("{}", ConnectionMode::Manual), "manual");
        assert!(ConnectionMode::Manual.is_manual());
        assert!(!ConnectionMode::Auto.is_manual());
    }
}
