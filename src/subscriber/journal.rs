//! JSON-lines journal of package messages

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::PackageMessage;

/// One message of the journal at its offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub offset: u64,
    /// When the publisher created the package
    #[serde(default = "Utc::now")]
    pub created_time: DateTime<Utc>,
    pub message: PackageMessage,
}

impl JournalEntry {
    pub fn new(offset: u64, message: PackageMessage) -> Self {
        Self {
            offset,
            created_time: Utc::now(),
            message,
        }
    }

    pub fn with_created_time(mut self, created_time: DateTime<Utc>) -> Self {
        self.created_time = created_time;
        self
    }

    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Read every entry of a journal file
///
/// Blank lines are ignored; lines that do not parse are logged and skipped.
pub fn read_journal<P: AsRef<Path>>(path: P) -> io::Result<Vec<JournalEntry>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match JournalEntry::from_json_line(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(
                    path = %path.as_ref().display(),
                    line = line_num + 1,
                    error = %e,
                    "Skipping unreadable journal entry"
                );
            }
        }
    }

    Ok(entries)
}
