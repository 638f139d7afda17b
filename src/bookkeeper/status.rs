//! Reporting of the stored status upstream

use tracing::{info, warn};

use crate::error::{SendError, StoreError};
use crate::store::Subservice;
use crate::types::{PackageStatus, PackageStatusMessage};

use super::{BookKeeper, WaitOutcome};

pub(crate) fn send_stored_status(bk: &BookKeeper, retry: u32) -> bool {
    let status = match bk.status_store.load() {
        Ok(record) => PackageStatus::from_map(&record),
        Err(e) => {
            warn!(retry, error = %e, "Cannot load stored status");
            retry_delay(bk);
            return false;
        }
    };
    if status.sent {
        return true;
    }

    match send_status_message(bk, &status) {
        Ok(()) => {
            mark_status_sent(bk);
            true
        }
        Err(e) => {
            warn!(retry, error = %e, "Cannot send status");
            retry_delay(bk);
            false
        }
    }
}

fn send_status_message(bk: &BookKeeper, status: &PackageStatus) -> Result<(), SendError> {
    let msg = PackageStatusMessage {
        sub_sling_id: bk.config.sub_sling_id.clone(),
        sub_agent_name: bk.config.sub_agent_name.clone(),
        pub_agent_name: status.pub_agent_name.clone(),
        offset: status.offset,
        status: status.status,
    };
    bk.collaborators.status_sink.send(&msg)?;
    info!(message = %msg, "Sent status message");
    Ok(())
}

/// Flag the stored status as sent; failures are only logged
pub(crate) fn mark_status_sent(bk: &BookKeeper) {
    if let Err(e) = try_mark_status_sent(bk) {
        warn!(error = %e, "Failed to mark status as sent");
    }
}

fn try_mark_status_sent(bk: &BookKeeper) -> Result<(), StoreError> {
    let mut session = bk.open_session(Subservice::Bookkeeper)?;
    bk.status_store
        .stage_map(session.as_mut(), PackageStatus::sent_marker())?;
    session.commit()
}

fn retry_delay(bk: &BookKeeper) {
    if bk.interrupt.wait(bk.retry_delay) == WaitOutcome::Interrupted {
        info!("Status retry delay interrupted");
    }
}
