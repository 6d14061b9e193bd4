//! Concurrent per-node data collection.
//!
//! For every node and every enabled category the collector spawns one task
//! that GETs the agent endpoint, decodes the body and sends exactly one
//! [`NodeReport`] on the shared channel, whether the fetch worked or not.

use std::net::{IpAddr, SocketAddr};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::{Category, CollectorConfig};
use crate::error::{FetchError, Result};
use crate::model::{
    ArpTable, BridgeDomainTable, InterfaceTable, L2FibTable, Node, NodeLiveness, TelemetryTable,
};

/// Decoded body of one category endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryPayload {
    Liveness(NodeLiveness),
    Interfaces(InterfaceTable),
    BridgeDomains(BridgeDomainTable),
    L2Fibs(L2FibTable),
    Telemetry(TelemetryTable),
    IpArp(ArpTable),
}

impl CategoryPayload {
    /// Decode a response body into the shape expected for `category`.
    pub fn decode(category: Category, body: &[u8]) -> std::result::Result<Self, FetchError> {
        let decoded = match category {
            Category::Liveness => serde_json::from_slice(body).map(CategoryPayload::Liveness),
            Category::Interfaces => serde_json::from_slice(body).map(CategoryPayload::Interfaces),
            Category::BridgeDomains => {
                serde_json::from_slice(body).map(CategoryPayload::BridgeDomains)
            }
            Category::L2Fibs => serde_json::from_slice(body).map(CategoryPayload::L2Fibs),
            Category::Telemetry => serde_json::from_slice(body).map(CategoryPayload::Telemetry),
            Category::IpArp => serde_json::from_slice(body).map(CategoryPayload::IpArp),
        };
        decoded.map_err(|e| FetchError::Decode(e.to_string()))
    }

    pub fn category(&self) -> Category {
        match self {
            CategoryPayload::Liveness(_) => Category::Liveness,
            CategoryPayload::Interfaces(_) => Category::Interfaces,
            CategoryPayload::BridgeDomains(_) => Category::BridgeDomains,
            CategoryPayload::L2Fibs(_) => Category::L2Fibs,
            CategoryPayload::Telemetry(_) => Category::Telemetry,
            CategoryPayload::IpArp(_) => Category::IpArp,
        }
    }
}

/// Outcome of a single (node, category) fetch.
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub node_name: String,
    pub category: Category,
    pub payload: std::result::Result<CategoryPayload, FetchError>,
}

impl NodeReport {
    pub fn ok(node_name: &str, payload: CategoryPayload) -> Self {
        Self {
            node_name: node_name.to_string(),
            category: payload.category(),
            payload: Ok(payload),
        }
    }

    pub fn failed(node_name: &str, category: Category, error: FetchError) -> Self {
        Self {
            node_name: node_name.to_string(),
            category,
            payload: Err(error),
        }
    }
}

/// HTTP collector for the per-node agent endpoints.
pub struct Collector {
    client: reqwest::Client,
    config: CollectorConfig,
}

impl Collector {
    pub fn new(config: CollectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn categories(&self) -> &[Category] {
        &self.config.categories
    }

    /// URL of a category endpoint on the node reachable at `management_address`.
    ///
    /// An address that already carries a port is used as is; otherwise the
    /// configured agent port is appended.
    pub fn endpoint_url(&self, management_address: &str, category: Category) -> String {
        format!(
            "{}://{}{}",
            self.config.scheme,
            authority(management_address, self.config.agent_port),
            self.config.path(category)
        )
    }

    /// Dispatch one fetch task per (node, category) and return the number of
    /// tasks started. Does not wait for any of them.
    pub fn collect(&self, nodes: &[&Node], tx: &mpsc::UnboundedSender<NodeReport>) -> usize {
        let mut dispatched = 0;
        for node in nodes {
            for &category in &self.config.categories {
                let client = self.client.clone();
                let url = self.endpoint_url(&node.management_ip_address, category);
                let node_name = node.name.clone();
                let tx = tx.clone();

                tokio::spawn(async move {
                    let report = match fetch(&client, &url, category).await {
                        Ok(payload) => {
                            debug!(node = %node_name, %category, "Fetched");
                            NodeReport::ok(&node_name, payload)
                        }
                        Err(e) => {
                            warn!(
                                node = %node_name,
                                %category,
                                url = %url,
                                error = %e,
                                "Fetch failed"
                            );
                            NodeReport::failed(&node_name, category, e)
                        }
                    };
                    // Receiver is gone once the aggregation deadline passed.
                    let _ = tx.send(report);
                });
                dispatched += 1;
            }
        }
        dispatched
    }
}

async fn fetch(
    client: &reqwest::Client,
    url: &str,
    category: Category,
) -> std::result::Result<CategoryPayload, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    CategoryPayload::decode(category, &body)
}

/// `host:port` for `address`, keeping a port the address already carries.
fn authority(address: &str, port: u16) -> String {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return addr.to_string();
    }
    if let Ok(ip) = unbracket(address).parse::<IpAddr>() {
        return SocketAddr::new(ip, port).to_string();
    }
    if let Some((host, p)) = address.rsplit_once(':') {
        if let Ok(p) = p.parse::<u16>() {
            // e.g. "[10.0.0.1]:9999"
            if let Ok(ip) = unbracket(host).parse::<IpAddr>() {
                return SocketAddr::new(ip, p).to_string();
            }
            if !host.contains(':') {
                return address.to_string();
            }
        }
    }
    format!("{}:{}", address, port)
}

fn unbracket(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}
