//! Bookkeeper - offset, status and retry handling of a subscriber agent
//!
//! For every message delivered by the consumer loop the bookkeeper applies
//! the package, then durably records status and offset in one commit:
//!
//! ```text
//! pre-process ─► apply ─► stage status ─► stage offset ─► commit ─► post-process
//!      │           │                                         │           │
//!      └───────────┴──────────── error ──────────────────────┴───────────┘
//!                                  │
//!                            failure policy ──► retry later (DistributionError)
//!                                           └─► give up: REMOVED_FAILED + offset
//! ```
//!
//! When the package handler only stages its changes into the session it is
//! given, content, status and offset commit together and packages are
//! processed effectively once. A handler that commits on its own leaves
//! at-least-once processing; committing the offset last keeps the window
//! of partial application small.
//!
//! The offset store is identified by the subscriber agent name only. One
//! bookkeeper instance must run per agent.

mod config;
mod delay;
mod failure;
mod import;
mod offsets;
mod retries;
mod skip;
mod status;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::collaborators::{
    EventSink, ImportPostProcessor, ImportPreProcessor, InvalidationProcessor, LogSink, Noop,
    PackageHandler, StatusSink,
};
use crate::error::{DistributionError, StoreError};
use crate::metrics::{MetricsSnapshot, SubscriberMetrics};
use crate::store::{value_of, LocalStore, SessionFactory, StoreSession, Subservice};
use crate::types::{PackageMessage, PackageStatus, KEY_OFFSET};

pub use config::{BookKeeperConfig, STORE_TYPE_STATUS};
pub use delay::{Interrupt, WaitOutcome, RETRY_SEND_DELAY};
pub use failure::NUM_ERRORS_BLOCKING;
pub use retries::PackageRetries;
pub use skip::{SkipCounter, COMMIT_AFTER_NUM_SKIPPED};

/// External collaborators of the bookkeeper
///
/// Everything except the package handler defaults to [`Noop`].
#[derive(Clone)]
pub struct Collaborators {
    pub package_handler: Arc<dyn PackageHandler>,
    pub pre_processor: Arc<dyn ImportPreProcessor>,
    pub post_processor: Arc<dyn ImportPostProcessor>,
    pub invalidation_processor: Arc<dyn InvalidationProcessor>,
    pub status_sink: Arc<dyn StatusSink>,
    pub log_sink: Arc<dyn LogSink>,
    pub event_sink: Arc<dyn EventSink>,
}

impl Collaborators {
    pub fn new(package_handler: Arc<dyn PackageHandler>) -> Self {
        Self {
            package_handler,
            pre_processor: Arc::new(Noop),
            post_processor: Arc::new(Noop),
            invalidation_processor: Arc::new(Noop),
            status_sink: Arc::new(Noop),
            log_sink: Arc::new(Noop),
            event_sink: Arc::new(Noop),
        }
    }

    pub fn with_pre_processor(mut self, pre_processor: Arc<dyn ImportPreProcessor>) -> Self {
        self.pre_processor = pre_processor;
        self
    }

    pub fn with_post_processor(mut self, post_processor: Arc<dyn ImportPostProcessor>) -> Self {
        self.post_processor = post_processor;
        self
    }

    pub fn with_invalidation_processor(
        mut self,
        invalidation_processor: Arc<dyn InvalidationProcessor>,
    ) -> Self {
        self.invalidation_processor = invalidation_processor;
        self
    }

    pub fn with_status_sink(mut self, status_sink: Arc<dyn StatusSink>) -> Self {
        self.status_sink = status_sink;
        self
    }

    pub fn with_log_sink(mut self, log_sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }

    pub fn with_event_sink(mut self, event_sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }
}

/// Keeps track of offset and processed status of one subscriber agent and
/// coordinates import and retry handling
///
/// All methods take `&self`; the bookkeeper can be shared between the
/// consumer loop and a status-sending task.
pub struct BookKeeper {
    pub(crate) config: BookKeeperConfig,
    pub(crate) factory: Arc<dyn SessionFactory>,
    pub(crate) collaborators: Collaborators,
    pub(crate) metrics: Arc<SubscriberMetrics>,
    pub(crate) retries: PackageRetries,
    pub(crate) skipped: SkipCounter,
    pub(crate) status_store: LocalStore,
    pub(crate) processed_offsets: LocalStore,
    pub(crate) clear_store: LocalStore,
    pub(crate) interrupt: Interrupt,
    pub(crate) retry_delay: Duration,
}

impl BookKeeper {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        config: BookKeeperConfig,
        collaborators: Collaborators,
    ) -> Self {
        let agent = config.sub_agent_name.clone();
        let status_store = LocalStore::new(factory.clone(), STORE_TYPE_STATUS, agent.clone());
        let processed_offsets =
            LocalStore::new(factory.clone(), config.package_node_name.clone(), agent.clone());
        let clear_store = LocalStore::new(factory.clone(), config.command_node_name.clone(), agent);

        info!(config = %config, "Started bookkeeper");

        Self {
            config,
            factory,
            collaborators,
            metrics: Arc::new(SubscriberMetrics::new()),
            retries: PackageRetries::new(),
            skipped: SkipCounter::new(),
            status_store,
            processed_offsets,
            clear_store,
            interrupt: Interrupt::new(),
            retry_delay: RETRY_SEND_DELAY,
        }
    }

    /// Share an interrupt that aborts status retry delays
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Replace the delay applied after a failed status send
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn config(&self) -> &BookKeeperConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<SubscriberMetrics> {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.retries.sum())
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Current retry count of a publisher agent
    pub fn retries(&self, pub_agent_name: &str) -> u32 {
        self.retries.get(pub_agent_name)
    }

    pub fn package_retries(&self) -> &PackageRetries {
        &self.retries
    }

    /// Reset the retry count of the message's publisher after a success
    pub fn clear_package_retries_on_success(&self, msg: &PackageMessage) {
        let pub_agent_name = &msg.pub_agent_name;
        if self.retries.get(pub_agent_name) > 0 {
            SubscriberMetrics::increment(&self.metrics.transient_import_errors);
        }
        self.retries.clear(pub_agent_name);
    }

    pub(crate) fn open_session(
        &self,
        subservice: Subservice,
    ) -> Result<Box<dyn StoreSession + '_>, StoreError> {
        self.factory.open_session(subservice)
    }

    pub(crate) fn store_status(
        &self,
        session: &mut dyn StoreSession,
        status: &PackageStatus,
    ) -> Result<(), StoreError> {
        let status_map = status.as_map();
        self.status_store.stage_map(session, status_map.clone())?;
        info!(status = ?status_map, "Stored status");
        Ok(())
    }

    /// Stage the processed offset; never moves a committed offset backwards
    pub(crate) fn store_offset(
        &self,
        session: &mut dyn StoreSession,
        offset: u64,
    ) -> Result<(), StoreError> {
        let record = self.processed_offsets.load_in(&*session)?;
        if let Some(current) = value_of::<u64>(&record, KEY_OFFSET)? {
            if current > offset {
                debug!(current, offset, "Keeping higher stored offset");
                return Ok(());
            }
        }
        self.processed_offsets.stage(session, KEY_OFFSET, offset)
    }
}

// Operations implemented in the submodules
impl BookKeeper {
    /// Import a package and durably record its offset
    ///
    /// Returns an error only when the same offset must be delivered again.
    pub fn import_package(
        &self,
        msg: &PackageMessage,
        offset: u64,
        created_time: DateTime<Utc>,
        import_start_time: DateTime<Utc>,
    ) -> Result<(), DistributionError> {
        import::import_package(self, msg, offset, created_time, import_start_time)
    }

    /// Invalidate caches for a package and durably record its offset
    pub fn invalidate_cache(
        &self,
        msg: &PackageMessage,
        offset: u64,
        created_time: DateTime<Utc>,
        import_start_time: DateTime<Utc>,
    ) -> Result<(), DistributionError> {
        import::invalidate_cache(self, msg, offset, created_time, import_start_time)
    }

    pub fn remove_package(&self, msg: &PackageMessage, offset: u64) -> Result<(), StoreError> {
        offsets::remove_package(self, msg, offset)
    }

    pub fn skip_package(&self, offset: u64) -> Result<(), StoreError> {
        offsets::skip_package(self, offset)
    }

    pub fn should_commit_skipped(&self) -> bool {
        self.skipped.should_commit()
    }

    /// Send the stored status if not sent yet
    ///
    /// Returns `true` once the status is delivered. A failed attempt
    /// blocks the caller for the retry delay and returns `false`.
    pub fn send_stored_status(&self, retry: u32) -> bool {
        status::send_stored_status(self, retry)
    }

    pub fn mark_status_sent(&self) {
        status::mark_status_sent(self)
    }

    /// Last processed offset, `None` before the first commit
    pub fn load_offset(&self) -> Result<Option<u64>, StoreError> {
        offsets::load_offset(self)
    }

    /// Seed the offset on first start; a no-op once an offset is stored
    pub fn handle_initial_offset(&self, offset: u64) {
        offsets::handle_initial_offset(self, offset)
    }

    pub fn get_clear_offset(&self) -> Result<Option<u64>, StoreError> {
        offsets::get_clear_offset(self)
    }

    pub fn store_clear_offset(&self, offset: u64) {
        offsets::store_clear_offset(self, offset)
    }
}
