//! TestRail result status vocabulary.
//!
//! TestRail identifies result statuses by small integers. The built-in
//! statuses are fixed and shared by every TestRail instance:
//!
//! | Status | Code |
//! |--------|------|
//! | Passed | 1 |
//! | Blocked | 2 |
//! | Untested | 3 |
//! | Retest | 4 |
//! | Failed | 5 |
//!
//! On the wire a [`Status`] is always its numeric code. In configuration
//! files it is written by name (`"failed"`, `"retest"`, ...).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A TestRail result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Status {
    Passed,
    Blocked,
    Untested,
    Retest,
    Failed,
}

impl Status {
    /// The numeric status id used by the TestRail API.
    pub fn code(self) -> u8 {
        match self {
            Status::Passed => 1,
            Status::Blocked => 2,
            Status::Untested => 3,
            Status::Retest => 4,
            Status::Failed => 5,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Blocked => "blocked",
            Status::Untested => "untested",
            Status::Retest => "retest",
            Status::Failed => "failed",
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for Status {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Status::Passed),
            2 => Ok(Status::Blocked),
            3 => Ok(Status::Untested),
            4 => Ok(Status::Retest),
            5 => Ok(Status::Failed),
            other => Err(format!("unknown TestRail status id: {}", other)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serde adapter for status fields written by name in configuration.
pub(crate) mod by_name {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Status;

    pub fn serialize<S: Serializer>(status: &Status, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(status.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Status, D::Error> {
        let name = String::deserialize(deserializer)?;
        from_name(&name).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "unknown status '{}'. Use: passed, blocked, untested, retest, failed",
                name
            ))
        })
    }

    pub(super) fn from_name(name: &str) -> Option<Status> {
        match name.to_ascii_lowercase().as_str() {
            "passed" => Some(Status::Passed),
            "blocked" => Some(Status::Blocked),
            "untested" => Some(Status::Untested),
            "retest" => Some(Status::Retest),
            "failed" => Some(Status::Failed),
            _ => None,
        }
    }
}
