use crate::error::SariError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Lifecycle state of a managed database.
///
/// States compare by [`DbStatus::rank`]: `ENABLED` and `AUTO_ENABLED` share a
/// rank, so `Ord` is not derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DbStatus {
    Absent,
    Disabled,
    Enabled,
    AutoEnabled,
    Accessible,
}

impl DbStatus {
    pub fn rank(self) -> u8 {
        match self {
            DbStatus::Absent => 0,
            DbStatus::Disabled => 1,
            DbStatus::Enabled | DbStatus::AutoEnabled => 2,
            DbStatus::Accessible => 3,
        }
    }

    pub fn cmp_rank(self, other: DbStatus) -> Ordering {
        self.rank().cmp(&other.rank())
    }

    /// `ENABLED`, `AUTO_ENABLED` or `ACCESSIBLE`.
    pub fn is_enabled(self) -> bool {
        self.rank() >= DbStatus::Enabled.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DbStatus::Absent => "ABSENT",
            DbStatus::Disabled => "DISABLED",
            DbStatus::Enabled => "ENABLED",
            DbStatus::AutoEnabled => "AUTO_ENABLED",
            DbStatus::Accessible => "ACCESSIBLE",
        }
    }
}

impl fmt::Display for DbStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DbStatus {
    type Err = SariError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ABSENT" => Ok(DbStatus::Absent),
            "DISABLED" => Ok(DbStatus::Disabled),
            "ENABLED" => Ok(DbStatus::Enabled),
            "AUTO_ENABLED" => Ok(DbStatus::AutoEnabled),
            "ACCESSIBLE" => Ok(DbStatus::Accessible),
            _ => Err(SariError::InvalidSetting {
                name: "status".to_string(),
                reason: format!("unknown database status '{s}'"),
            }),
        }
    }
}
