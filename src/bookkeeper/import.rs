//! Package import and cache invalidation

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{ApplyError, DistributionError, ImportError, PostProcessError, PreProcessError};
use crate::metrics::{CurrentImport, SubscriberMetrics};
use crate::store::Subservice;
use crate::types::{DistributionEvent, PackageMessage, PackageStatus, Status};

use super::{failure, BookKeeper};

/// Import a package (thread-safe, but calls for one agent must not overlap)
///
/// Content, status and offset are staged into one session and committed
/// together; post-processing runs after the commit. Any error is handed to
/// the failure policy, including a panic in a collaborator.
pub fn import_package(
    bk: &BookKeeper,
    msg: &PackageMessage,
    offset: u64,
    created_time: DateTime<Utc>,
    import_start_time: DateTime<Utc>,
) -> Result<(), DistributionError> {
    debug!(package = %msg, offset, "Importing distribution package");

    let started = Instant::now();
    let result = catch_runtime_error(|| {
        try_import(bk, msg, offset, created_time, import_start_time)
    });
    bk.metrics.imported_package_duration.record(started.elapsed());
    bk.metrics.clear_current_import();

    match result {
        Ok(()) => Ok(()),
        Err(e) => failure::failure(bk, msg, offset, created_time, e),
    }
}

fn try_import(
    bk: &BookKeeper,
    msg: &PackageMessage,
    offset: u64,
    created_time: DateTime<Utc>,
    import_start_time: DateTime<Utc>,
) -> Result<(), ImportError> {
    let mut session = bk.open_session(Subservice::Importer)?;

    pre_process(bk, msg)?;

    bk.metrics.set_current_import(CurrentImport {
        pkg_id: msg.pkg_id.clone(),
        pub_agent_name: msg.pub_agent_name.clone(),
        offset,
        start_time: import_start_time,
    });
    bk.collaborators
        .package_handler
        .apply(session.as_mut(), msg)?;
    if bk.config.editable {
        let status = PackageStatus::new(Status::Imported, offset, msg.pub_agent_name.clone());
        bk.store_status(session.as_mut(), &status)?;
    }
    bk.store_offset(session.as_mut(), offset)?;
    session.commit()?;

    bk.metrics
        .imported_package_size
        .fetch_add(msg.pkg_length, std::sync::atomic::Ordering::Relaxed);
    bk.metrics.package_distributed_duration.record_since(created_time);

    post_process(bk, msg)?;

    bk.clear_package_retries_on_success(msg);

    bk.collaborators
        .event_sink
        .post(DistributionEvent::applied(
            msg,
            offset,
            created_time,
            &bk.config.sub_agent_name,
        ));
    let import_duration_ms = (Utc::now() - import_start_time).num_milliseconds();
    info!(
        package = %msg,
        offset,
        import_duration_ms,
        created = %created_time,
        "Imported distribution package"
    );
    bk.metrics.increment_status(&msg.pub_agent_name, Status::Imported);
    Ok(())
}

/// Invalidate caches for a package, recording status and offset like an import
pub fn invalidate_cache(
    bk: &BookKeeper,
    msg: &PackageMessage,
    offset: u64,
    created_time: DateTime<Utc>,
    import_start_time: DateTime<Utc>,
) -> Result<(), DistributionError> {
    debug!(package = %msg, offset, "Invalidating the cache for the package");

    let result = catch_runtime_error(|| {
        try_invalidate(bk, msg, offset, created_time, import_start_time)
    });
    match result {
        Ok(()) => Ok(()),
        Err(e) => failure::failure(bk, msg, offset, created_time, e),
    }
}

fn try_invalidate(
    bk: &BookKeeper,
    msg: &PackageMessage,
    offset: u64,
    created_time: DateTime<Utc>,
    import_start_time: DateTime<Utc>,
) -> Result<(), ImportError> {
    let mut session = bk.open_session(Subservice::Bookkeeper)?;
    let props = msg.properties();

    let started = Instant::now();
    SubscriberMetrics::increment(&bk.metrics.invalidation_process_requests);

    bk.collaborators.invalidation_processor.process(&props)?;

    if bk.config.editable {
        let status = PackageStatus::new(Status::Imported, offset, msg.pub_agent_name.clone());
        bk.store_status(session.as_mut(), &status)?;
    }
    bk.store_offset(session.as_mut(), offset)?;
    session.commit()?;

    bk.clear_package_retries_on_success(msg);

    bk.collaborators
        .event_sink
        .post(DistributionEvent::applied(
            msg,
            offset,
            created_time,
            &bk.config.sub_agent_name,
        ));
    let import_duration_ms = (Utc::now() - import_start_time).num_milliseconds();
    info!(
        package = %msg,
        offset,
        import_duration_ms,
        "Invalidated the cache for the package"
    );

    bk.metrics.increment_status(&msg.pub_agent_name, Status::Imported);
    bk.metrics.invalidation_process_duration.record(started.elapsed());
    SubscriberMetrics::increment(&bk.metrics.invalidation_process_success);
    Ok(())
}

/// Turn a panic in a collaborator into an apply error
fn catch_runtime_error<F>(f: F) -> Result<(), ImportError>
where
    F: FnOnce() -> Result<(), ImportError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(ApplyError::new(format!(
            "unexpected runtime error: {}",
            panic_message(payload.as_ref())
        ))
        .into()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn pre_process(bk: &BookKeeper, msg: &PackageMessage) -> Result<(), PreProcessError> {
    debug!(package = %msg, "Executing import pre processor");
    let props = msg.properties();

    let started = Instant::now();
    SubscriberMetrics::increment(&bk.metrics.import_pre_process_requests);

    bk.collaborators.pre_processor.process(&props)?;

    debug!(pkg_id = %msg.pkg_id, "Executed import pre processor");
    bk.metrics.import_pre_process_duration.record(started.elapsed());
    SubscriberMetrics::increment(&bk.metrics.import_pre_process_success);
    Ok(())
}

fn post_process(bk: &BookKeeper, msg: &PackageMessage) -> Result<(), PostProcessError> {
    debug!(package = %msg, "Executing import post processor");
    let props = msg.properties();

    let started = Instant::now();
    SubscriberMetrics::increment(&bk.metrics.import_post_process_requests);

    bk.collaborators.post_processor.process(&props)?;

    debug!(pkg_id = %msg.pkg_id, "Executed import post processor");
    bk.metrics.import_post_process_duration.record(started.elapsed());
    SubscriberMetrics::increment(&bk.metrics.import_post_process_success);
    Ok(())
}
