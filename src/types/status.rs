//! Processing status records and the messages reporting them upstream

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ValueMap;

/// Key holding the offset in the status and offset records
pub const KEY_OFFSET: &str = "offset";
const KEY_PUB_AGENT_NAME: &str = "pubAgentName";
const KEY_STATUS_NUMBER: &str = "statusNumber";
const KEY_SENT: &str = "sent";

/// Outcome of processing a package at an offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Given up after exhausting retries
    RemovedFailed,
    /// Explicitly withdrawn
    Removed,
    Imported,
}

impl Status {
    /// Number used in the persisted record
    pub fn number(self) -> i64 {
        match self {
            Status::RemovedFailed => 0,
            Status::Removed => 1,
            Status::Imported => 2,
        }
    }

    pub fn from_number(number: i64) -> Option<Self> {
        match number {
            0 => Some(Status::RemovedFailed),
            1 => Some(Status::Removed),
            2 => Some(Status::Imported),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::RemovedFailed => "REMOVED_FAILED",
            Status::Removed => "REMOVED",
            Status::Imported => "IMPORTED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single durable status record of a subscriber agent
///
/// Fields are optional because the record is read back from an untyped
/// value map that may be empty or partially written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageStatus {
    pub status: Option<Status>,
    pub offset: Option<u64>,
    pub pub_agent_name: Option<String>,
    /// Whether a status message for this record was delivered
    pub sent: bool,
}

impl PackageStatus {
    /// A fresh, not yet reported status
    pub fn new(status: Status, offset: u64, pub_agent_name: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            offset: Some(offset),
            pub_agent_name: Some(pub_agent_name.into()),
            sent: false,
        }
    }

    /// Read a status from its stored value map
    ///
    /// A missing `sent` key reads as `true` so that an agent which never
    /// stored a status has nothing to report.
    pub fn from_map(map: &ValueMap) -> Self {
        Self {
            status: map
                .get(KEY_STATUS_NUMBER)
                .and_then(Value::as_i64)
                .and_then(Status::from_number),
            offset: map.get(KEY_OFFSET).and_then(Value::as_u64),
            pub_agent_name: map
                .get(KEY_PUB_AGENT_NAME)
                .and_then(Value::as_str)
                .map(str::to_string),
            sent: map.get(KEY_SENT).and_then(Value::as_bool).unwrap_or(true),
        }
    }

    pub fn as_map(&self) -> ValueMap {
        let mut map = ValueMap::new();
        if let Some(name) = &self.pub_agent_name {
            map.insert(KEY_PUB_AGENT_NAME.to_string(), Value::from(name.clone()));
        }
        if let Some(status) = self.status {
            map.insert(KEY_STATUS_NUMBER.to_string(), Value::from(status.number()));
        }
        if let Some(offset) = self.offset {
            map.insert(KEY_OFFSET.to_string(), Value::from(offset));
        }
        map.insert(KEY_SENT.to_string(), Value::from(self.sent));
        map
    }

    /// Value map that flips only the `sent` flag
    pub fn sent_marker() -> ValueMap {
        let mut map = ValueMap::new();
        map.insert(KEY_SENT.to_string(), Value::from(true));
        map
    }
}

/// Status message sent upstream to the publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageStatusMessage {
    pub sub_sling_id: String,
    pub sub_agent_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl fmt::Display for PackageStatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PackageStatusMessage(subAgentName={}, pubAgentName={}, offset={}, status={})",
            self.sub_agent_name,
            self.pub_agent_name.as_deref().unwrap_or("-"),
            self.offset.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string()),
            self.status.map(Status::as_str).unwrap_or("-"),
        )
    }
}

/// Diagnostic record describing a failed import attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    pub pub_agent_name: String,
    pub sub_sling_id: String,
    pub sub_agent_name: String,
    pub message: String,
    pub stacktrace: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_numbers() {
        for status in [Status::RemovedFailed, Status::Removed, Status::Imported] {
            assert_eq!(Status::from_number(status.number()), Some(status));
        }
        assert_eq!(Status::from_number(7), None);
    }

    #[test]
    fn test_status_map_layout() {
        let status = PackageStatus::new(Status::Imported, 100, "pub1");
        let map = status.as_map();

        assert_eq!(map.get("statusNumber"), Some(&Value::from(2)));
        assert_eq!(map.get("offset"), Some(&Value::from(100u64)));
        assert_eq!(map.get("pubAgentName"), Some(&Value::from("pub1")));
        assert_eq!(map.get("sent"), Some(&Value::from(false)));
        assert_eq!(PackageStatus::from_map(&map), status);
    }

    #[test]
    fn test_empty_map_reads_as_sent() {
        let status = PackageStatus::from_map(&ValueMap::new());

        assert!(status.sent);
        assert_eq!(status.status, None);
        assert_eq!(status.offset, None);
    }

    #[test]
    fn test_sent_marker_merges_over_status() {
        let mut map = PackageStatus::new(Status::Removed, 3, "pub1").as_map();
        map.extend(PackageStatus::sent_marker());

        let status = PackageStatus::from_map(&map);
        assert!(status.sent);
        assert_eq!(status.status, Some(Status::Removed));
    }
}
