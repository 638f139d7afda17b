//! JSON-lines sinks
//!
//! Status and log messages are appended one JSON document per line and
//! synced to disk before `send` returns.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::SendError;
use crate::types::{DistributionEvent, LogMessage, PackageStatusMessage};

use super::{EventSink, LogSink, StatusSink};

/// Appends messages to a JSON-lines file
pub struct JsonlSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append<T: Serialize>(&self, msg: &T) -> Result<(), SendError> {
        let line = serde_json::to_string(msg).map_err(|e| SendError(e.to_string()))?;

        let _guard = self.write_lock.lock();
        self.append_line(&line)
            .map_err(|e| SendError(format!("{}: {}", self.path.display(), e)))
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        file.sync_all()
    }
}

impl StatusSink for JsonlSink {
    fn send(&self, msg: &PackageStatusMessage) -> Result<(), SendError> {
        self.append(msg)
    }
}

impl LogSink for JsonlSink {
    fn send(&self, msg: &LogMessage) -> Result<(), SendError> {
        self.append(msg)
    }
}

/// Posts events to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn post(&self, event: DistributionEvent) {
        match &event {
            DistributionEvent::PackageApplied {
                package_id,
                component_name,
                distribution_type,
                offset,
                ..
            } => info!(
                package_id = %package_id,
                component_name = %component_name,
                distribution_type = %distribution_type,
                offset,
                "Package applied"
            ),
            DistributionEvent::ImportFailed {
                package_id,
                offset,
                retries,
                give_up,
                cause,
                ..
            } => warn!(
                package_id = %package_id,
                offset,
                retries,
                give_up,
                cause = %cause,
                "Package import failed"
            ),
        }
    }
}
