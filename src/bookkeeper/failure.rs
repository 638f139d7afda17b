//! Failure policy for import and invalidation errors

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{error_chain, DistributionError, ImportError, StoreError};
use crate::metrics::SubscriberMetrics;
use crate::store::Subservice;
use crate::types::{DistributionEvent, LogMessage, PackageMessage, PackageStatus, Status};

use super::BookKeeper;

/// Retry count at which a failing package starts counting as blocking
pub const NUM_ERRORS_BLOCKING: u32 = 4;

/// Decide between retry and give-up after a failed attempt
///
/// Returns `Ok(())` when the package was given up and its offset stored,
/// [`DistributionError::RetryRequested`] when the offset must be delivered
/// again.
pub(crate) fn failure(
    bk: &BookKeeper,
    msg: &PackageMessage,
    offset: u64,
    created_time: DateTime<Utc>,
    cause: ImportError,
) -> Result<(), DistributionError> {
    SubscriberMetrics::increment(&bk.metrics.failed_package_imports);

    let pub_agent_name = &msg.pub_agent_name;
    let retries = bk.retries.get(pub_agent_name);
    let max_retries = bk.config.max_retries;
    let give_up = bk.config.error_queue_enabled() && i64::from(retries) >= i64::from(max_retries);
    let max_label = if bk.config.error_queue_enabled() {
        max_retries.to_string()
    } else {
        "infinite".to_string()
    };
    let action = if give_up { "skip the package" } else { "retry later" };
    let message = format!(
        "Failed attempt ({}/{}) to import the distribution package {} at offset={} because of '{}', the importer will {}",
        retries,
        max_label,
        msg.summary(),
        offset,
        cause,
        action
    );

    let log_message = LogMessage {
        pub_agent_name: pub_agent_name.clone(),
        sub_sling_id: bk.config.sub_sling_id.clone(),
        sub_agent_name: bk.config.sub_agent_name.clone(),
        message: message.clone(),
        stacktrace: error_chain(&cause),
    };
    if let Err(e) = bk.collaborators.log_sink.send(&log_message) {
        warn!(error = %e, "Error sending log message");
    }

    bk.collaborators.event_sink.post(DistributionEvent::failed(
        msg,
        offset,
        created_time,
        retries,
        max_retries,
        give_up,
        &cause,
    ));

    if give_up {
        warn!(cause = %error_chain(&cause), "{}", message);
        remove_failed_package(bk, msg, offset).map_err(DistributionError::RemoveFailed)?;
        SubscriberMetrics::increment(&bk.metrics.permanent_import_errors);
        Ok(())
    } else {
        if retries == NUM_ERRORS_BLOCKING {
            SubscriberMetrics::increment(&bk.metrics.blocking_import_errors);
        }
        bk.retries.increase(pub_agent_name);
        Err(DistributionError::RetryRequested { message, cause })
    }
}

/// Store REMOVED_FAILED and advance past the offset in one commit
///
/// The status is written even when status editing is disabled.
fn remove_failed_package(
    bk: &BookKeeper,
    msg: &PackageMessage,
    offset: u64,
) -> Result<(), StoreError> {
    info!(package = %msg, offset, "Removing failed distribution package");
    let started = Instant::now();

    let mut session = bk.open_session(Subservice::Bookkeeper)?;
    let status = PackageStatus::new(Status::RemovedFailed, offset, msg.pub_agent_name.clone());
    bk.store_status(session.as_mut(), &status)?;
    bk.store_offset(session.as_mut(), offset)?;
    session.commit()?;
    drop(session);

    bk.metrics.removed_failed_package_duration.record(started.elapsed());
    bk.metrics
        .increment_status(&msg.pub_agent_name, Status::RemovedFailed);
    Ok(())
}
