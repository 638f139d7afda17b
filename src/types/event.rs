//! Distribution events posted after each processed package

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PackageMessage, RequestType};

/// Events emitted by the bookkeeper
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistributionEvent {
    /// A package was imported or a cache invalidated
    PackageApplied {
        package_id: String,
        /// Subscriber agent that applied the package
        component_name: String,
        distribution_type: RequestType,
        paths: Vec<String>,
        offset: u64,
        created_time: DateTime<Utc>,
    },

    /// An attempt to import a package failed
    ImportFailed {
        package_id: String,
        pub_agent_name: String,
        offset: u64,
        created_time: DateTime<Utc>,
        retries: u32,
        /// Negative when retries are unbounded
        max_retries: i32,
        give_up: bool,
        cause: String,
    },
}

impl DistributionEvent {
    pub fn applied(
        msg: &PackageMessage,
        offset: u64,
        created_time: DateTime<Utc>,
        sub_agent_name: &str,
    ) -> Self {
        DistributionEvent::PackageApplied {
            package_id: msg.pkg_id.clone(),
            component_name: sub_agent_name.to_string(),
            distribution_type: msg.req_type,
            paths: msg.paths.clone(),
            offset,
            created_time,
        }
    }

    pub fn failed(
        msg: &PackageMessage,
        offset: u64,
        created_time: DateTime<Utc>,
        retries: u32,
        max_retries: i32,
        give_up: bool,
        cause: &dyn std::error::Error,
    ) -> Self {
        DistributionEvent::ImportFailed {
            package_id: msg.pkg_id.clone(),
            pub_agent_name: msg.pub_agent_name.clone(),
            offset,
            created_time,
            retries,
            max_retries,
            give_up,
            cause: cause.to_string(),
        }
    }
}
