//! Collaborators the bookkeeper calls out to
//!
//! - `PackageHandler`: installs package content
//! - `ImportPreProcessor` / `ImportPostProcessor` / `InvalidationProcessor`:
//!   hooks over the message's [`ProcessorProperties`]
//! - `StatusSink` / `LogSink` / `EventSink`: fire-and-forget reporting
//!
//! Hooks and sinks are implemented for plain closures so callers can wire
//! them without defining types.

mod jsonl;

use crate::error::{ApplyError, InvalidationError, PostProcessError, PreProcessError, SendError};
use crate::store::StoreSession;
use crate::types::{
    DistributionEvent, LogMessage, PackageMessage, PackageStatusMessage, ProcessorProperties,
};

pub use jsonl::{JsonlSink, TracingEventSink};

/// Installs the content of a package
///
/// The handler receives the session the bookkeeper will commit the status
/// and offset with. A handler that only stages into it is committed
/// together with them (effectively-once); a handler that commits on its own
/// gives at-least-once processing.
pub trait PackageHandler: Send + Sync {
    fn apply(&self, session: &mut dyn StoreSession, msg: &PackageMessage) -> Result<(), ApplyError>;
}

pub trait ImportPreProcessor: Send + Sync {
    fn process(&self, props: &ProcessorProperties) -> Result<(), PreProcessError>;
}

pub trait ImportPostProcessor: Send + Sync {
    fn process(&self, props: &ProcessorProperties) -> Result<(), PostProcessError>;
}

pub trait InvalidationProcessor: Send + Sync {
    fn process(&self, props: &ProcessorProperties) -> Result<(), InvalidationError>;
}

/// Delivers status messages upstream
pub trait StatusSink: Send + Sync {
    fn send(&self, msg: &PackageStatusMessage) -> Result<(), SendError>;
}

/// Delivers diagnostic log messages upstream
pub trait LogSink: Send + Sync {
    fn send(&self, msg: &LogMessage) -> Result<(), SendError>;
}

pub trait EventSink: Send + Sync {
    fn post(&self, event: DistributionEvent);
}

/// Hook and sink that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl ImportPreProcessor for Noop {
    fn process(&self, _props: &ProcessorProperties) -> Result<(), PreProcessError> {
        Ok(())
    }
}

impl ImportPostProcessor for Noop {
    fn process(&self, _props: &ProcessorProperties) -> Result<(), PostProcessError> {
        Ok(())
    }
}

impl InvalidationProcessor for Noop {
    fn process(&self, _props: &ProcessorProperties) -> Result<(), InvalidationError> {
        Ok(())
    }
}

impl StatusSink for Noop {
    fn send(&self, _msg: &PackageStatusMessage) -> Result<(), SendError> {
        Ok(())
    }
}

impl LogSink for Noop {
    fn send(&self, _msg: &LogMessage) -> Result<(), SendError> {
        Ok(())
    }
}

impl EventSink for Noop {
    fn post(&self, _event: DistributionEvent) {}
}

impl<F> PackageHandler for F
where
    F: Fn(&mut dyn StoreSession, &PackageMessage) -> Result<(), ApplyError> + Send + Sync,
{
    fn apply(&self, session: &mut dyn StoreSession, msg: &PackageMessage) -> Result<(), ApplyError> {
        self(session, msg)
    }
}

impl<F> ImportPreProcessor for F
where
    F: Fn(&ProcessorProperties) -> Result<(), PreProcessError> + Send + Sync,
{
    fn process(&self, props: &ProcessorProperties) -> Result<(), PreProcessError> {
        self(props)
    }
}

impl<F> ImportPostProcessor for F
where
    F: Fn(&ProcessorProperties) -> Result<(), PostProcessError> + Send + Sync,
{
    fn process(&self, props: &ProcessorProperties) -> Result<(), PostProcessError> {
        self(props)
    }
}

impl<F> InvalidationProcessor for F
where
    F: Fn(&ProcessorProperties) -> Result<(), InvalidationError> + Send + Sync,
{
    fn process(&self, props: &ProcessorProperties) -> Result<(), InvalidationError> {
        self(props)
    }
}

impl<F> StatusSink for F
where
    F: Fn(&PackageStatusMessage) -> Result<(), SendError> + Send + Sync,
{
    fn send(&self, msg: &PackageStatusMessage) -> Result<(), SendError> {
        self(msg)
    }
}

impl<F> LogSink for F
where
    F: Fn(&LogMessage) -> Result<(), SendError> + Send + Sync,
{
    fn send(&self, msg: &LogMessage) -> Result<(), SendError> {
        self(msg)
    }
}

impl<F> EventSink for F
where
    F: Fn(DistributionEvent) + Send + Sync,
{
    fn post(&self, event: DistributionEvent) {
        self(event)
    }
}
