//! Collector and validator configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Default port the node agents serve their endpoints on.
pub const DEFAULT_AGENT_PORT: u16 = 9999;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for draining all reports of one collection pass.
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Internal name of the interface used as a node's identity anchor.
pub const DEFAULT_LOOPBACK_NAME: &str = "loop0";

/// Prefix length appended to ARP addresses before looking them up in the
/// loopback IP index.
pub const DEFAULT_ARP_PREFIX_LEN: u8 = 24;

/// One kind of per-node data fetched from the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Liveness,
    Interfaces,
    BridgeDomains,
    L2Fibs,
    Telemetry,
    IpArp,
}

impl Category {
    /// Categories fetched unless configured otherwise.
    pub const DEFAULT: [Category; 5] = [
        Category::Liveness,
        Category::Interfaces,
        Category::BridgeDomains,
        Category::L2Fibs,
        Category::IpArp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Liveness => "liveness",
            Category::Interfaces => "interfaces",
            Category::BridgeDomains => "bridge_domains",
            Category::L2Fibs => "l2_fibs",
            Category::Telemetry => "telemetry",
            Category::IpArp => "ip_arp",
        }
    }

    /// Well-known agent path for this category.
    pub fn default_path(&self) -> &'static str {
        match self {
            Category::Liveness => "/liveness",
            Category::Interfaces => "/interfaces",
            Category::BridgeDomains => "/bridgedomains",
            Category::L2Fibs => "/l2fibs",
            Category::Telemetry => "/telemetry",
            Category::IpArp => "/arp",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for [`crate::collector::Collector`] and the aggregation join.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub scheme: String,
    pub agent_port: u16,
    pub request_timeout: Duration,
    pub collect_timeout: Duration,
    pub categories: Vec<Category>,
    /// Per-category endpoint overrides; see [`Self::path`].
    pub paths: HashMap<Category, String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            scheme: "http".to_string(),
            agent_port: DEFAULT_AGENT_PORT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            collect_timeout: DEFAULT_COLLECT_TIMEOUT,
            categories: Category::DEFAULT.to_vec(),
            paths: HashMap::new(),
        }
    }
}

impl CollectorConfig {
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_agent_port(mut self, port: u16) -> Self {
        self.agent_port = port;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Deadline for one whole collection pass.
    pub fn with_collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = timeout;
        self
    }

    /// Enable telemetry collection in addition to the default categories.
    pub fn with_telemetry(mut self) -> Self {
        if !self.categories.contains(&Category::Telemetry) {
            self.categories.push(Category::Telemetry);
        }
        self
    }

    /// Override the endpoint path of a category.
    pub fn with_path(mut self, category: Category, path: impl Into<String>) -> Self {
        self.paths.insert(category, path.into());
        self
    }

    pub fn path(&self, category: Category) -> &str {
        self.paths
            .get(&category)
            .map(String::as_str)
            .unwrap_or_else(|| category.default_path())
    }
}

/// Settings for [`crate::validator::Validator`].
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub loopback_name: String,
    pub arp_prefix_len: u8,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            loopback_name: DEFAULT_LOOPBACK_NAME.to_string(),
            arp_prefix_len: DEFAULT_ARP_PREFIX_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories_exclude_telemetry() {
        let config = CollectorConfig::default();
        assert_eq!(config.categories.len(), 5);
        assert!(!config.categories.contains(&Category::Telemetry));

        let config = config.with_telemetry().with_telemetry();
        assert_eq!(config.categories.len(), 6);
    }

    #[test]
    fn test_path_override() {
        let config = CollectorConfig::default().with_path(Category::IpArp, "/ip-arp");
        assert_eq!(config.path(Category::IpArp), "/ip-arp");
        assert_eq!(config.path(Category::L2Fibs), "/l2fibs");
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let config = CollectorConfig::default()
            .with_scheme("https")
            .with_agent_port(9191)
            .with_request_timeout(Duration::from_secs(2))
            .with_collect_timeout(Duration::from_secs(5))
            .with_path(Category::Liveness, "/health");

        assert_eq!(config.scheme, "https");
        assert_eq!(config.agent_port, 9191);
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.collect_timeout, Duration::from_secs(5));
        assert_eq!(config.categories, Category::DEFAULT.to_vec());
        assert_eq!(config.path(Category::Liveness), "/health");
    }
}
