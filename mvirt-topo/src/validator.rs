//! Cross-node loopback address validation.
//!
//! Every node advertises a MAC and one or more IPs on its loopback interface.
//! The ARP entries a node learned on that interface must resolve, through the
//! loopback indices, to one and the same peer.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ValidatorConfig;
use crate::store::NodeStore;

/// Result of [`Validator::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    /// Nodes without a single ARP entry that resolved consistently. Only
    /// evaluated when no mismatch stopped the pass.
    pub unconfirmed: Vec<String>,
    /// Nodes skipped because they lack the loopback interface.
    pub missing_loopback: Vec<String>,
}

pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Rebuild the loopback MAC and IP indices from the given nodes.
    ///
    /// Nodes without a loopback interface are skipped; their names are
    /// returned. An address claimed by two nodes stays with the first and is
    /// recorded as a duplicate for both.
    pub fn populate_node_maps(&self, store: &mut NodeStore, node_names: &[String]) -> Vec<String> {
        store.clear_loopback_indices();
        let mut missing = Vec::new();

        for name in node_names {
            let loopback = match store.get_node(name) {
                Ok(node) => node
                    .interface_by_internal_name(&self.config.loopback_name)
                    .map(|intf| (intf.ip_addresses.clone(), intf.phys_address.clone())),
                Err(e) => {
                    warn!(node = %name, error = %e, "Skipping node");
                    continue;
                }
            };

            let Some((ip_addresses, mac)) = loopback else {
                error!(
                    node = %name,
                    loopback = %self.config.loopback_name,
                    "Node does not have a loop interface"
                );
                store.record_error(
                    name,
                    format!("node does not have a {} interface", self.config.loopback_name),
                );
                missing.push(name.clone());
                continue;
            };

            for ip in &ip_addresses {
                if let Some(owner) = store.index_loopback_ip(ip, name) {
                    error!(node = %name, owner = %owner, ip = %ip, "Duplicate IP found");
                    record_duplicate(store, "IP", ip, name, &owner);
                }
            }

            if mac.is_empty() {
                warn!(node = %name, "Loop interface has no MAC address");
            } else if let Some(owner) = store.index_loopback_mac(&mac, name) {
                error!(node = %name, owner = %owner, mac = %mac, "Duplicate MAC address found");
                record_duplicate(store, "MAC", &mac, name, &owner);
            }
        }

        missing
    }

    /// Check that every loopback ARP entry's MAC and IP resolve to the same
    /// node. Returns `false` on the first mismatch.
    ///
    /// [`Self::populate_node_maps`] must have run first.
    pub fn validate_loopback_addresses(
        &self,
        store: &mut NodeStore,
        node_names: &[String],
    ) -> bool {
        self.check_arp_tables(store, node_names).is_some()
    }

    /// Populate the indices and validate in one pass.
    pub fn validate(&self, store: &mut NodeStore, node_names: &[String]) -> ValidationOutcome {
        let missing_loopback = self.populate_node_maps(store, node_names);
        match self.check_arp_tables(store, node_names) {
            Some(unconfirmed) => ValidationOutcome {
                valid: true,
                unconfirmed,
                missing_loopback,
            },
            None => ValidationOutcome {
                valid: false,
                unconfirmed: Vec::new(),
                missing_loopback,
            },
        }
    }

    /// Walk the ARP tables. `None` on a mismatch, otherwise the names left
    /// unconfirmed.
    fn check_arp_tables(
        &self,
        store: &mut NodeStore,
        node_names: &[String],
    ) -> Option<Vec<String>> {
        let mut unconfirmed: BTreeSet<String> = store.node_names().into_iter().collect();

        for name in node_names {
            let Ok(node) = store.get_node(name) else {
                continue;
            };
            let Some(loop_index) = node
                .interface_by_internal_name(&self.config.loopback_name)
                .map(|intf| intf.if_index)
            else {
                error!(
                    node = %name,
                    "Cannot process node ARP table because loop interface info is missing"
                );
                continue;
            };

            let mut confirmed = false;
            let mut mismatch = None;

            for arp in node.ip_arps.iter().filter(|arp| arp.interface == loop_index) {
                let mac_node = store.node_by_loopback_mac(&arp.mac_address);
                if mac_node.is_none() {
                    error!(node = %name, mac = %arp.mac_address, "Node for MAC address not found");
                }
                let ip_key = format!("{}/{}", arp.ip_address, self.config.arp_prefix_len);
                let ip_node = store.node_by_loopback_ip(&ip_key);
                if ip_node.is_none() {
                    error!(
                        node = %name,
                        ip = %arp.ip_address,
                        "Could not find node with IP address"
                    );
                }

                let (Some(mac_node), Some(ip_node)) = (mac_node, ip_node) else {
                    continue;
                };

                if mac_node.name != ip_node.name {
                    error!(
                        node = %name,
                        mac_node = %mac_node.name,
                        ip_node = %ip_node.name,
                        arp = ?arp,
                        "MAC and IP point to different nodes"
                    );
                    mismatch = Some(format!(
                        "ARP entry {} / {} resolves to {} by MAC and {} by IP",
                        arp.mac_address, arp.ip_address, mac_node.name, ip_node.name
                    ));
                    break;
                }
                confirmed = true;
            }

            if let Some(message) = mismatch {
                store.record_error(name, message);
                return None;
            }
            if confirmed {
                unconfirmed.remove(name);
            }
        }

        for name in &unconfirmed {
            error!(node = %name, "No MAC entry found");
            store.record_error(name, "no loopback ARP entry resolved to a known node");
        }
        if unconfirmed.is_empty() {
            info!(nodes = node_names.len(), "Loopback addresses validated");
        }

        Some(unconfirmed.into_iter().collect())
    }
}

/// Note a loopback address claimed by both `name` and `owner` on each of them.
fn record_duplicate(store: &mut NodeStore, kind: &str, address: &str, name: &str, owner: &str) {
    store.record_error(name, format!("duplicate loopback {kind} {address} also on {owner}"));
    store.record_error(owner, format!("duplicate loopback {kind} {address} also on {name}"));
}
