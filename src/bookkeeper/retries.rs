//! Consecutive failure counts per publisher agent

use std::collections::HashMap;

use parking_lot::Mutex;

/// In-memory retry ledger keyed by publisher agent name
///
/// Counts are lost on restart, which gives every publisher a fresh retry
/// budget.
#[derive(Debug, Default)]
pub struct PackageRetries {
    retries: Mutex<HashMap<String, u32>>,
}

impl PackageRetries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pub_agent_name: &str) -> u32 {
        self.retries.lock().get(pub_agent_name).copied().unwrap_or(0)
    }

    pub fn increase(&self, pub_agent_name: &str) {
        *self
            .retries
            .lock()
            .entry(pub_agent_name.to_string())
            .or_insert(0) += 1;
    }

    pub fn clear(&self, pub_agent_name: &str) {
        self.retries.lock().remove(pub_agent_name);
    }

    /// Sum over all publisher agents
    pub fn sum(&self) -> u64 {
        self.retries.lock().values().map(|&r| u64::from(r)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_are_per_publisher() {
        let retries = PackageRetries::new();
        retries.increase("pub1");
        retries.increase("pub1");
        retries.increase("pub2");

        assert_eq!(retries.get("pub1"), 2);
        assert_eq!(retries.get("pub2"), 1);
        assert_eq!(retries.get("pub3"), 0);
        assert_eq!(retries.sum(), 3);
    }

    #[test]
    fn test_clear_resets_to_zero() {
        let retries = PackageRetries::new();
        retries.increase("pub1");
        retries.clear("pub1");

        assert_eq!(retries.get("pub1"), 0);
        retries.increase("pub1");
        assert_eq!(retries.get("pub1"), 1);
    }
}
