//! Offset lifecycle: removal, skips, initial and clear offsets

use std::time::Instant;

use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::Subservice;
use crate::types::{PackageMessage, PackageStatus, Status, KEY_OFFSET};

use super::BookKeeper;

pub(crate) fn remove_package(
    bk: &BookKeeper,
    msg: &PackageMessage,
    offset: u64,
) -> Result<(), StoreError> {
    info!(
        pkg_id = %msg.pkg_id,
        req_type = %msg.req_type,
        offset,
        "Removing distribution package"
    );
    let started = Instant::now();

    let mut session = bk.open_session(Subservice::Bookkeeper)?;
    if bk.config.editable {
        let status = PackageStatus::new(Status::Removed, offset, msg.pub_agent_name.clone());
        bk.store_status(session.as_mut(), &status)?;
    }
    bk.store_offset(session.as_mut(), offset)?;
    session.commit()?;
    drop(session);

    bk.retries.clear(&msg.pub_agent_name);
    bk.metrics.removed_package_duration.record(started.elapsed());
    bk.metrics.increment_status(&msg.pub_agent_name, Status::Removed);
    Ok(())
}

/// Skip an offset, committing it only once per batch of skips
pub(crate) fn skip_package(bk: &BookKeeper, offset: u64) -> Result<(), StoreError> {
    info!(offset, "Skipping package");
    if bk.should_commit_skipped() {
        let mut session = bk.open_session(Subservice::Bookkeeper)?;
        bk.store_offset(session.as_mut(), offset)?;
        session.commit()?;
    }
    Ok(())
}

pub(crate) fn load_offset(bk: &BookKeeper) -> Result<Option<u64>, StoreError> {
    bk.processed_offsets.load_value::<u64>(KEY_OFFSET)
}

pub(crate) fn handle_initial_offset(bk: &BookKeeper, offset: u64) {
    if let Err(e) = try_handle_initial_offset(bk, offset) {
        warn!(offset, error = %e, "Error storing initial offset");
    }
}

fn try_handle_initial_offset(bk: &BookKeeper, offset: u64) -> Result<(), StoreError> {
    let mut session = bk.open_session(Subservice::Bookkeeper)?;
    if load_offset(bk)?.is_none() {
        info!(
            package_node_name = %bk.config.package_node_name,
            sub_agent_name = %bk.config.sub_agent_name,
            offset,
            "Storing initial offset"
        );
        bk.store_offset(session.as_mut(), offset)?;
        session.commit()?;
    }
    Ok(())
}

pub(crate) fn get_clear_offset(bk: &BookKeeper) -> Result<Option<u64>, StoreError> {
    bk.clear_store.load_value::<u64>(KEY_OFFSET)
}

pub(crate) fn store_clear_offset(bk: &BookKeeper, offset: u64) {
    if let Err(e) = bk.clear_store.store(KEY_OFFSET, offset) {
        warn!(offset, error = %e, "Failed to persist clear offset");
    }
}
