//! Distribution package messages read from the journal

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of request carried by a package message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    /// Install content
    Add,
    /// Remove content
    Delete,
    /// Connectivity test, never applied
    Test,
    /// Invalidate cached content for the paths
    Invalidate,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Add => "ADD",
            RequestType::Delete => "DELETE",
            RequestType::Test => "TEST",
            RequestType::Invalidate => "INVALIDATE",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable distribution package message
///
/// Messages are produced by a publisher agent and may be delivered more
/// than once by the journal after a crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMessage {
    /// Identity of the publishing agent
    pub pub_agent_name: String,
    pub req_type: RequestType,
    pub pkg_id: String,
    #[serde(default)]
    pub paths: Vec<String>,
    /// Length of the package payload in bytes
    #[serde(default)]
    pub pkg_length: u64,
}

impl PackageMessage {
    pub fn new(
        pub_agent_name: impl Into<String>,
        req_type: RequestType,
        pkg_id: impl Into<String>,
        paths: Vec<String>,
    ) -> Self {
        Self {
            pub_agent_name: pub_agent_name.into(),
            req_type,
            pkg_id: pkg_id.into(),
            paths,
            pkg_length: 0,
        }
    }

    pub fn with_length(mut self, pkg_length: u64) -> Self {
        self.pkg_length = pkg_length;
        self
    }

    /// Short rendering without the path list
    pub fn summary(&self) -> String {
        format!(
            "PackageMessage(pkgId={}, reqType={}, pubAgentName={}, pkgLength={})",
            self.pkg_id, self.req_type, self.pub_agent_name, self.pkg_length
        )
    }

    /// Property view handed to the processing hooks
    pub fn properties(&self) -> ProcessorProperties {
        ProcessorProperties {
            distribution_type: self.req_type,
            paths: self.paths.clone(),
            package_id: self.pkg_id.clone(),
            component_name: self.pub_agent_name.clone(),
        }
    }
}

impl fmt::Display for PackageMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PackageMessage(pkgId={}, reqType={}, pubAgentName={}, pkgLength={}, paths={:?})",
            self.pkg_id, self.req_type, self.pub_agent_name, self.pkg_length, self.paths
        )
    }
}

/// Properties passed to pre/post-processors and the invalidation hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorProperties {
    pub distribution_type: RequestType,
    pub paths: Vec<String>,
    pub package_id: String,
    /// Publisher agent that produced the package
    pub component_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_view() {
        let msg = PackageMessage::new(
            "pub1",
            RequestType::Add,
            "pkg-1",
            vec!["/content/a".to_string()],
        );
        let props = msg.properties();

        assert_eq!(props.distribution_type, RequestType::Add);
        assert_eq!(props.paths, vec!["/content/a"]);
        assert_eq!(props.package_id, "pkg-1");
        assert_eq!(props.component_name, "pub1");
    }

    #[test]
    fn test_message_json_shape() {
        let json = r#"{"pubAgentName":"pub1","reqType":"INVALIDATE","pkgId":"p","paths":["/a"]}"#;
        let msg: PackageMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.req_type, RequestType::Invalidate);
        assert_eq!(msg.pkg_length, 0);
    }

    #[test]
    fn test_summary_omits_paths() {
        let msg = PackageMessage::new("pub1", RequestType::Delete, "pkg-9", vec!["/x".into()]);

        assert!(!msg.summary().contains("/x"));
        assert!(msg.to_string().contains("/x"));
    }
}
