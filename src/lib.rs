//! Journal Bookkeeper
//!
//! Offset, status and retry bookkeeping for a subscriber agent that consumes
//! content distribution packages from an ordered journal.
//!
//! # Features
//!
//! - **Atomic progress**: package content, status and offset commit together
//! - **Bounded retries**: per-publisher retry ledger with give-up after `max_retries`
//! - **Status reporting**: idempotent upstream delivery of the stored status
//! - **Batched skips**: skipped offsets are committed once every ten skips
//! - **Durable stores**: in-memory and file-backed record stores
//!
//! # Modules
//!
//! - `types`: Package messages, statuses, events
//! - `error`: Error types
//! - `store`: Durable record store and sessions
//! - `collaborators`: Package handler, hooks and sinks
//! - `metrics`: Subscriber counters and durations
//! - `bookkeeper`: The bookkeeper and its configuration
//! - `subscriber`: Consumer loop and journal reader
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use journal_bookkeeper::collaborators::PackageHandler;
//! use journal_bookkeeper::error::ApplyError;
//! use journal_bookkeeper::{BookKeeper, BookKeeperConfig, Collaborators, FileStore};
//! use journal_bookkeeper::{read_journal, PackageMessage, StoreSession, Subscriber};
//!
//! struct Installer;
//!
//! impl PackageHandler for Installer {
//!     fn apply(&self, _session: &mut dyn StoreSession, _msg: &PackageMessage) -> Result<(), ApplyError> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(FileStore::open("./data")?);
//!     let bookkeeper = BookKeeper::new(
//!         store,
//!         BookKeeperConfig::new("sling-1", "subscriber-1").with_max_retries(3),
//!         Collaborators::new(Arc::new(Installer)),
//!     );
//!     let summary = Subscriber::new(Arc::new(bookkeeper)).run(read_journal("journal.jsonl")?);
//!     println!("{:?}", summary);
//!     Ok(())
//! }
//! ```

pub mod bookkeeper;
pub mod collaborators;
pub mod error;
pub mod metrics;
pub mod store;
pub mod subscriber;
pub mod types;

// Re-export commonly used items at crate root
pub use bookkeeper::{BookKeeper, BookKeeperConfig, Collaborators, Interrupt};
pub use error::{DistributionError, ImportError, StoreError};
pub use metrics::{MetricsSnapshot, SubscriberMetrics};
pub use store::{FileStore, LocalStore, MemoryStore, SessionFactory, StoreSession, Subservice};
pub use subscriber::{read_journal, JournalEntry, RunSummary, Subscriber};
pub use types::{PackageMessage, PackageStatus, RequestType, Status};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
