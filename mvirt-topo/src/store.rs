//! In-memory node store.
//!
//! Owns every [`Node`] by name and keeps the secondary address indices used
//! during validation. Indices refer to nodes by name.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::error::{Result, TopoError};
use crate::model::{
    Node, NodeBridgeDomain, NodeInterface, NodeIpArp, NodeL2Fib, NodeLiveness, NodeTelemetry,
};

#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: BTreeMap<String, Node>,
    management_index: HashMap<String, String>,
    loop_ip_index: HashMap<String, String>,
    loop_mac_index: HashMap<String, String>,
    /// Diagnostics keyed by node name, filled by validation.
    error_report: BTreeMap<String, Vec<String>>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Fails if a node with the same name already exists; the
    /// existing node is left untouched in that case.
    ///
    /// A management address already used by another node stays indexed to
    /// that node.
    pub fn add_node(
        &mut self,
        id: u32,
        name: &str,
        ip_address: &str,
        management_ip_address: &str,
    ) -> Result<()> {
        if self.nodes.contains_key(name) {
            return Err(TopoError::DuplicateKey(name.to_string()));
        }
        self.nodes.insert(
            name.to_string(),
            Node::new(id, name, ip_address, management_ip_address),
        );
        if let Some(owner) = claim(&mut self.management_index, management_ip_address, name) {
            warn!(
                node = %name,
                owner = %owner,
                management = %management_ip_address,
                "Management address already in use"
            );
        }
        Ok(())
    }

    pub fn get_node(&self, name: &str) -> Result<&Node> {
        self.nodes
            .get(name)
            .ok_or_else(|| TopoError::NotFound(name.to_string()))
    }

    pub fn get_node_mut(&mut self, name: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| TopoError::NotFound(name.to_string()))
    }

    /// Remove a node and every index entry that points at it.
    pub fn delete_node(&mut self, name: &str) -> Result<Node> {
        let node = self
            .nodes
            .remove(name)
            .ok_or_else(|| TopoError::NotFound(name.to_string()))?;
        self.management_index.retain(|_, owner| owner.as_str() != name);
        self.loop_ip_index.retain(|_, owner| owner.as_str() != name);
        self.loop_mac_index.retain(|_, owner| owner.as_str() != name);
        self.error_report.remove(name);
        Ok(node)
    }

    /// All nodes, ordered by name.
    pub fn get_all_nodes(&self) -> Vec<&Node> {
        self.nodes.values().collect()
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // === Category setters ===

    pub fn set_node_liveness(&mut self, name: &str, liveness: Option<NodeLiveness>) -> Result<()> {
        self.get_node_mut(name)?.liveness = liveness;
        Ok(())
    }

    pub fn set_node_interfaces(
        &mut self,
        name: &str,
        interfaces: Vec<NodeInterface>,
    ) -> Result<()> {
        self.get_node_mut(name)?.interfaces = interfaces;
        Ok(())
    }

    pub fn set_node_bridge_domains(
        &mut self,
        name: &str,
        bridge_domains: Vec<NodeBridgeDomain>,
    ) -> Result<()> {
        self.get_node_mut(name)?.bridge_domains = bridge_domains;
        Ok(())
    }

    pub fn set_node_l2_fibs(&mut self, name: &str, l2_fibs: Vec<NodeL2Fib>) -> Result<()> {
        self.get_node_mut(name)?.l2_fibs = l2_fibs;
        Ok(())
    }

    pub fn set_node_telemetry(&mut self, name: &str, telemetry: Vec<NodeTelemetry>) -> Result<()> {
        self.get_node_mut(name)?.telemetry = telemetry;
        Ok(())
    }

    pub fn set_node_ip_arps(&mut self, name: &str, ip_arps: Vec<NodeIpArp>) -> Result<()> {
        self.get_node_mut(name)?.ip_arps = ip_arps;
        Ok(())
    }

    // === Address indices ===

    pub fn node_by_management_address(&self, address: &str) -> Option<&Node> {
        self.management_index
            .get(address)
            .and_then(|name| self.nodes.get(name))
    }

    pub fn node_by_loopback_ip(&self, address: &str) -> Option<&Node> {
        self.loop_ip_index
            .get(address)
            .and_then(|name| self.nodes.get(name))
    }

    pub fn node_by_loopback_mac(&self, mac: &str) -> Option<&Node> {
        self.loop_mac_index
            .get(mac)
            .and_then(|name| self.nodes.get(name))
    }

    /// Claim a loopback IP for `owner`. Returns the name of a different node
    /// that already holds the address, leaving the index unchanged.
    pub fn index_loopback_ip(&mut self, address: &str, owner: &str) -> Option<String> {
        claim(&mut self.loop_ip_index, address, owner)
    }

    /// Claim a loopback MAC for `owner`, same semantics as [`Self::index_loopback_ip`].
    pub fn index_loopback_mac(&mut self, mac: &str, owner: &str) -> Option<String> {
        claim(&mut self.loop_mac_index, mac, owner)
    }

    pub fn clear_loopback_indices(&mut self) {
        self.loop_ip_index.clear();
        self.loop_mac_index.clear();
    }

    // === Diagnostics ===

    pub fn record_error(&mut self, name: &str, message: impl Into<String>) {
        self.error_report
            .entry(name.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn error_report(&self) -> &BTreeMap<String, Vec<String>> {
        &self.error_report
    }

    pub fn clear_error_report(&mut self) {
        self.error_report.clear();
    }
}

fn claim(index: &mut HashMap<String, String>, key: &str, owner: &str) -> Option<String> {
    match index.get(key) {
        Some(existing) if existing != owner => Some(existing.clone()),
        Some(_) => None,
        None => {
            index.insert(key.to_string(), owner.to_string());
            None
        }
    }
}
