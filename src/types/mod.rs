//! Data types for the journal bookkeeper
//!
//! Messages read from the journal, the processing status records kept per
//! subscriber agent, and the events/messages reported back.

mod event;
mod message;
mod status;

pub use event::DistributionEvent;
pub use message::{PackageMessage, ProcessorProperties, RequestType};
pub use status::{LogMessage, PackageStatus, PackageStatusMessage, Status, KEY_OFFSET};

/// Untyped record stored under a store type and agent name
pub type ValueMap = serde_json::Map<String, serde_json::Value>;
