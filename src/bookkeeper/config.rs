//! Bookkeeper configuration

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Store type holding the processing status record
pub const STORE_TYPE_STATUS: &str = "statuses";

/// Read-only configuration of one subscriber agent's bookkeeper
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BookKeeperConfig {
    /// Identity of the subscriber instance
    pub sub_sling_id: String,
    pub sub_agent_name: String,
    /// Store type holding the processed offset
    pub package_node_name: String,
    /// Store type holding the clear offset
    pub command_node_name: String,
    /// Whether processing statuses are stored and reported upstream
    pub editable: bool,
    /// Retries before a package is given up; negative retries forever
    pub max_retries: i32,
}

impl Default for BookKeeperConfig {
    fn default() -> Self {
        Self {
            sub_sling_id: "subscriber".to_string(),
            sub_agent_name: "agent".to_string(),
            package_node_name: "packages".to_string(),
            command_node_name: "commands".to_string(),
            editable: false,
            max_retries: -1,
        }
    }
}

impl BookKeeperConfig {
    pub fn new(sub_sling_id: impl Into<String>, sub_agent_name: impl Into<String>) -> Self {
        Self {
            sub_sling_id: sub_sling_id.into(),
            sub_agent_name: sub_agent_name.into(),
            ..Default::default()
        }
    }

    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_store_types(
        mut self,
        package_node_name: impl Into<String>,
        command_node_name: impl Into<String>,
    ) -> Self {
        self.package_node_name = package_node_name.into();
        self.command_node_name = command_node_name.into();
        self
    }

    /// Read the configuration from `BOOKKEEPER_*` environment variables
    ///
    /// Absent or unparsable variables keep their default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sub_sling_id: env_or("BOOKKEEPER_SUB_SLING_ID", defaults.sub_sling_id),
            sub_agent_name: env_or("BOOKKEEPER_SUB_AGENT", defaults.sub_agent_name),
            package_node_name: env_or("BOOKKEEPER_PACKAGE_NODE", defaults.package_node_name),
            command_node_name: env_or("BOOKKEEPER_COMMAND_NODE", defaults.command_node_name),
            editable: env_or("BOOKKEEPER_EDITABLE", defaults.editable),
            max_retries: env_or("BOOKKEEPER_MAX_RETRIES", defaults.max_retries),
        }
    }

    /// Error queue eviction applies only when retries are bounded
    pub fn error_queue_enabled(&self) -> bool {
        self.max_retries >= 0
    }
}

impl fmt::Display for BookKeeperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BookKeeperConfig(subSlingId={}, subAgentName={}, packageNodeName={}, commandNodeName={}, editable={}, maxRetries={})",
            self.sub_sling_id,
            self.sub_agent_name,
            self.package_node_name,
            self.command_node_name,
            self.editable,
            self.max_retries
        )
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}
