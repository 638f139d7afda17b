//! Consumer loop driving a [`BookKeeper`] over journal entries
//!
//! Entries are handled strictly in offset order. An entry whose handling
//! asks for a retry is handled again after the retry delay; the loop only
//! moves on once the bookkeeper has imported, skipped or given up on it.

mod journal;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::bookkeeper::{BookKeeper, WaitOutcome};
use crate::error::{error_chain, DistributionError};
use crate::types::RequestType;

pub use journal::{read_journal, JournalEntry};

/// Counts of one run of the consumer loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Entries imported, invalidated, given up on or skipped as TEST
    pub handled: u64,
    /// Entries at or below the stored offset
    pub already_processed: u64,
    /// Failed attempts that were retried
    pub retries: u64,
    /// The run stopped on an interrupt before the last entry
    pub interrupted: bool,
}

/// Sequential consumer for one subscriber agent
pub struct Subscriber {
    bookkeeper: Arc<BookKeeper>,
    initial_offset: Option<u64>,
}

impl Subscriber {
    pub fn new(bookkeeper: Arc<BookKeeper>) -> Self {
        Self {
            bookkeeper,
            initial_offset: None,
        }
    }

    /// Offset to seed when the agent has never stored one
    pub fn with_initial_offset(mut self, offset: u64) -> Self {
        self.initial_offset = Some(offset);
        self
    }

    pub fn bookkeeper(&self) -> &Arc<BookKeeper> {
        &self.bookkeeper
    }

    /// Handle `entries` until exhausted or interrupted
    pub fn run<I>(&self, entries: I) -> RunSummary
    where
        I: IntoIterator<Item = JournalEntry>,
    {
        let bk = &self.bookkeeper;
        let interrupt = bk.interrupt();
        let mut summary = RunSummary::default();

        if let Some(offset) = self.initial_offset {
            bk.handle_initial_offset(offset);
        }
        let mut last_offset = match bk.load_offset() {
            Ok(offset) => offset,
            Err(e) => {
                warn!(error = %e, "Cannot load stored offset, replaying from the start");
                None
            }
        };
        info!(
            sub_agent_name = %bk.config().sub_agent_name,
            offset = ?last_offset,
            "Starting consumer loop"
        );

        for entry in entries {
            if interrupt.is_triggered() {
                summary.interrupted = true;
                break;
            }
            if last_offset.is_some_and(|last| entry.offset <= last) {
                debug!(offset = entry.offset, "Ignoring already processed entry");
                summary.already_processed += 1;
                continue;
            }

            if !self.handle_until_done(&entry, &mut summary) {
                summary.interrupted = true;
                break;
            }
            summary.handled += 1;
            last_offset = Some(entry.offset);

            if bk.config().editable && !self.send_status_until_done() {
                summary.interrupted = true;
                break;
            }
        }

        info!(
            handled = summary.handled,
            already_processed = summary.already_processed,
            retries = summary.retries,
            interrupted = summary.interrupted,
            "Consumer loop finished"
        );
        summary
    }

    /// Returns `false` when interrupted before the entry was handled
    fn handle_until_done(&self, entry: &JournalEntry, summary: &mut RunSummary) -> bool {
        let bk = &self.bookkeeper;
        loop {
            match self.handle(entry) {
                Ok(()) => return true,
                Err(e) => {
                    summary.retries += 1;
                    warn!(
                        offset = entry.offset,
                        error = %error_chain(&e),
                        "Error processing entry, retrying"
                    );
                    if bk.interrupt().wait(bk.retry_delay()) == WaitOutcome::Interrupted {
                        return false;
                    }
                }
            }
        }
    }

    fn handle(&self, entry: &JournalEntry) -> Result<(), DistributionError> {
        let bk = &self.bookkeeper;
        let msg = &entry.message;
        let import_start_time = Utc::now();
        match msg.req_type {
            RequestType::Test => {
                bk.skip_package(entry.offset)
                    .map_err(|e| DistributionError::RetryRequested {
                        message: format!("Failed to skip package at offset={}", entry.offset),
                        cause: e.into(),
                    })
            }
            RequestType::Invalidate => {
                bk.invalidate_cache(msg, entry.offset, entry.created_time, import_start_time)
            }
            RequestType::Add | RequestType::Delete => {
                bk.import_package(msg, entry.offset, entry.created_time, import_start_time)
            }
        }
    }

    /// Returns `false` when interrupted before the status was sent
    fn send_status_until_done(&self) -> bool {
        let bk = &self.bookkeeper;
        let mut retry = 0;
        while !bk.send_stored_status(retry) {
            if bk.interrupt().is_triggered() {
                return false;
            }
            retry += 1;
        }
        true
    }
}
