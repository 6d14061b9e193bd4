//! Node state as reported by the per-node agents.
//!
//! Field names follow the JSON emitted by the agent endpoints so that the
//! payloads decode directly into these types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A cluster member and everything collected about it.
///
/// Category fields are filled independently by the aggregator; a node whose
/// fetch for some category failed simply has that field empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: u32,
    pub name: String,
    /// Data-plane address.
    pub ip_address: String,
    /// Address the agent endpoints are polled on.
    pub management_ip_address: String,
    pub liveness: Option<NodeLiveness>,
    /// Ordered by interface index.
    pub interfaces: Vec<NodeInterface>,
    /// Ordered by bridge domain index.
    pub bridge_domains: Vec<NodeBridgeDomain>,
    /// Ordered by FIB key.
    pub l2_fibs: Vec<NodeL2Fib>,
    /// Ordered by telemetry key.
    pub telemetry: Vec<NodeTelemetry>,
    pub ip_arps: Vec<NodeIpArp>,
}

impl Node {
    pub fn new(id: u32, name: &str, ip_address: &str, management_ip_address: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            ip_address: ip_address.to_string(),
            management_ip_address: management_ip_address.to_string(),
            ..Default::default()
        }
    }

    /// Look up an interface by its agent-side index.
    pub fn interface(&self, if_index: u32) -> Option<&NodeInterface> {
        self.interfaces.iter().find(|i| i.if_index == if_index)
    }

    /// The interface whose internal name matches `internal_name`.
    pub fn interface_by_internal_name(&self, internal_name: &str) -> Option<&NodeInterface> {
        self.interfaces
            .iter()
            .find(|i| i.vpp_internal_name == internal_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeLiveness {
    pub build_version: String,
    pub build_date: String,
    pub state: u32,
    pub start_time: u32,
    pub last_change: u32,
    pub last_update: u32,
    pub commit_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInterface {
    /// Key the interface was reported under; set during aggregation.
    pub if_index: u32,
    pub vpp_internal_name: String,
    pub name: String,
    #[serde(rename = "type")]
    pub if_type: u32,
    pub enabled: bool,
    pub phys_address: String,
    pub mtu: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vxlan: Option<Vxlan>,
    /// CIDR notation, e.g. `192.168.30.1/24`.
    pub ip_addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tap: Option<Tap>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vxlan {
    pub src_address: String,
    pub dst_address: String,
    pub vni: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tap {
    pub version: u32,
    pub host_if_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeBridgeDomain {
    /// Key the bridge domain was reported under; set during aggregation.
    pub bd_index: u32,
    pub interfaces: Vec<BridgeDomainInterface>,
    pub name: String,
    pub forward: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeDomainInterface {
    pub sw_if_index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeL2Fib {
    pub bridge_domain_idx: u32,
    pub outgoing_interface_sw_if_idx: u32,
    pub phys_address: String,
    pub static_config: bool,
    pub bridged_virtual_interface: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeTelemetry {
    pub command: String,
    pub output: Vec<TelemetryOutput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryOutput {
    pub command: String,
    pub output: Vec<TelemetryOutputEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryOutputEntry {
    pub node_name: String,
    pub count: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeIpArp {
    pub interface: u32,
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
    #[serde(rename = "MacAddress")]
    pub mac_address: String,
    #[serde(rename = "Static")]
    pub is_static: bool,
}

/// ARP table as served by the agent: either a plain list or keyed entries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ArpTable {
    List(Vec<NodeIpArp>),
    Keyed(HashMap<String, NodeIpArp>),
}

pub type InterfaceTable = HashMap<u32, NodeInterface>;
pub type BridgeDomainTable = HashMap<u32, NodeBridgeDomain>;
pub type L2FibTable = HashMap<String, NodeL2Fib>;
pub type TelemetryTable = HashMap<String, NodeTelemetry>;
