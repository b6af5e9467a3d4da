//! Health check results shared by plugins, the registry and the monitor.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Outcome of a single check.
///
/// `Fail` means the monitored target is down, `Error` means the check itself
/// could not be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthState {
    Ok,
    Warn,
    Error,
    Fail,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Ok => "OK",
            HealthState::Warn => "WARN",
            HealthState::Error => "ERROR",
            HealthState::Fail => "FAIL",
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            HealthState::Ok => 0,
            HealthState::Warn => 1,
            HealthState::Error => 2,
            HealthState::Fail => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HealthState::Ok),
            1 => Some(HealthState::Warn),
            2 => Some(HealthState::Error),
            3 => Some(HealthState::Fail),
            _ => None,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// The wire format carries the numeric code; the label travels separately.
impl Serialize for HealthState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for HealthState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        HealthState::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("invalid health state {}", code)))
    }
}

/// Snapshot of one check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    #[serde(rename = "state_string")]
    pub state_label: String,
    #[serde(rename = "component")]
    pub component_name: String,
    pub detail: String,
}

impl HealthStatus {
    pub fn new(state: HealthState, detail: impl Into<String>) -> Self {
        Self {
            state,
            state_label: state.as_str().to_string(),
            component_name: String::new(),
            detail: detail.into(),
        }
    }

    pub fn ok(detail: impl Into<String>) -> Self {
        Self::new(HealthState::Ok, detail)
    }

    pub fn warn(detail: impl Into<String>) -> Self {
        Self::new(HealthState::Warn, detail)
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self::new(HealthState::Error, detail)
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self::new(HealthState::Fail, detail)
    }

    /// Re-tag the status with the owning component's name.
    pub fn with_component(mut self, name: impl Into<String>) -> Self {
        self.component_name = name.into();
        self
    }

    pub fn is_ok(&self) -> bool {
        self.state == HealthState::Ok
    }
}
