//! Node identity sources used to seed the store before collection.

use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TopoError};
use crate::store::NodeStore;

/// Identity of a cluster member as published by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub ip_address: String,
    pub management_ip_address: String,
}

impl std::str::FromStr for NodeIdentity {
    type Err = TopoError;

    /// Parse `id:name:management[:data]`.
    ///
    /// A port is only accepted after a bracketed management address, e.g.
    /// `2:worker:[fd00::2]:9999` or `2:worker:[10.20.0.10]:9999`. In the
    /// unbracketed form everything after the management host is the data
    /// address, so `1:master:10.20.0.2:9999` is rejected.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TopoError::InvalidNodeIdentity(s.to_string());

        let (id, rest) = s.split_once(':').ok_or_else(invalid)?;
        let (name, rest) = rest.split_once(':').ok_or_else(invalid)?;
        let id: u32 = id.parse().map_err(|_| invalid())?;
        if name.is_empty() || rest.is_empty() {
            return Err(invalid());
        }

        let (management, data) = if rest.starts_with('[') {
            let end = rest.find(']').ok_or_else(invalid)?;
            if rest[1..end].parse::<IpAddr>().is_err() {
                return Err(invalid());
            }
            // Keep an optional port that follows the bracket.
            let after = &rest[end + 1..];
            match after.strip_prefix(':') {
                Some(tail) => match tail.split_once(':') {
                    Some((port, data)) if port.parse::<u16>().is_ok() => {
                        (&rest[..end + 2 + port.len()], data)
                    }
                    _ if tail.parse::<u16>().is_ok() => (rest, ""),
                    _ => (&rest[..=end], tail),
                },
                None if after.is_empty() => (rest, ""),
                None => return Err(invalid()),
            }
        } else {
            let (management, data) = rest.split_once(':').unwrap_or((rest, ""));
            // A leading number that is not part of an IPv6 address is a port.
            let first = data.split(':').next().unwrap_or_default();
            if first.parse::<u16>().is_ok() && data.parse::<IpAddr>().is_err() {
                return Err(invalid());
            }
            (management, data)
        };

        Ok(Self {
            id,
            name: name.to_string(),
            ip_address: data.to_string(),
            management_ip_address: management.to_string(),
        })
    }
}

/// Source of node identities.
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeIdentity>>;
}

/// Fixed list of nodes, e.g. from the command line.
pub struct StaticNodeSource {
    nodes: Vec<NodeIdentity>,
}

impl StaticNodeSource {
    pub fn new(nodes: Vec<NodeIdentity>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl NodeSource for StaticNodeSource {
    async fn list_nodes(&self) -> Result<Vec<NodeIdentity>> {
        Ok(self.nodes.clone())
    }
}

/// JSON file containing an array of [`NodeIdentity`].
pub struct FileNodeSource {
    path: PathBuf,
}

impl FileNodeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl NodeSource for FileNodeSource {
    async fn list_nodes(&self) -> Result<Vec<NodeIdentity>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let nodes: Vec<NodeIdentity> = serde_json::from_str(&content)?;
        Ok(nodes)
    }
}

/// Add every node of `source` to `store`. Nodes already present are skipped.
/// Returns the number of nodes added.
pub async fn seed_store(store: &mut NodeStore, source: &dyn NodeSource) -> Result<usize> {
    let mut added = 0;
    for identity in source.list_nodes().await? {
        match store.add_node(
            identity.id,
            &identity.name,
            &identity.ip_address,
            &identity.management_ip_address,
        ) {
            Ok(()) => {
                info!(
                    node = %identity.name,
                    id = identity.id,
                    management = %identity.management_ip_address,
                    "Added node"
                );
                added += 1;
            }
            Err(e) => warn!(node = %identity.name, error = %e, "Skipping node"),
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: u32, name: &str, management: &str, data: &str) -> NodeIdentity {
        NodeIdentity {
            id,
            name: name.into(),
            ip_address: data.into(),
            management_ip_address: management.into(),
        }
    }

    #[test]
    fn test_parse_node_identity() {
        let parsed: NodeIdentity = "1:k8s-master:10.20.0.2:192.168.16.1".parse().unwrap();
        assert_eq!(parsed, identity(1, "k8s-master", "10.20.0.2", "192.168.16.1"));

        let parsed: NodeIdentity = "2:k8s-worker1:10.20.0.10".parse().unwrap();
        assert_eq!(parsed, identity(2, "k8s-worker1", "10.20.0.10", ""));
    }

    #[test]
    fn test_parse_node_identity_ipv6() {
        let parsed: NodeIdentity = "3:w:[fd00::2]".parse().unwrap();
        assert_eq!(parsed.management_ip_address, "[fd00::2]");

        let parsed: NodeIdentity = "3:w:[fd00::2]:9999".parse().unwrap();
        assert_eq!(parsed.management_ip_address, "[fd00::2]:9999");
        assert_eq!(parsed.ip_address, "");

        let parsed: NodeIdentity = "3:w:[fd00::2]:9999:fd01::2".parse().unwrap();
        assert_eq!(parsed.management_ip_address, "[fd00::2]:9999");
        assert_eq!(parsed.ip_address, "fd01::2");

        let parsed: NodeIdentity = "3:w:[fd00::2]:fd01::2".parse().unwrap();
        assert_eq!(parsed.management_ip_address, "[fd00::2]");
        assert_eq!(parsed.ip_address, "fd01::2");
    }

    #[test]
    fn test_parse_node_identity_invalid() {
        assert!("k8s-master".parse::<NodeIdentity>().is_err());
        assert!("x:k8s-master:10.20.0.2".parse::<NodeIdentity>().is_err());
        assert!("1::10.20.0.2".parse::<NodeIdentity>().is_err());
        assert!("1:k8s-master:".parse::<NodeIdentity>().is_err());
    }

    #[test]
    fn test_port_requires_brackets() {
        assert!("1:n:10.0.0.1:9999".parse::<NodeIdentity>().is_err());
        assert!("1:n:10.0.0.1:9999:192.168.16.1".parse::<NodeIdentity>().is_err());

        let parsed: NodeIdentity = "1:n:10.0.0.1:2001:db8::1".parse().unwrap();
        assert_eq!(parsed.ip_address, "2001:db8::1");
        assert!("1:n:[worker-1]:9999".parse::<NodeIdentity>().is_err());

        let parsed: NodeIdentity = "1:n:[10.0.0.1]:9999".parse().unwrap();
        assert_eq!(parsed.management_ip_address, "[10.0.0.1]:9999");
        assert_eq!(parsed.ip_address, "");
    }

    #[tokio::test]
    async fn test_seed_store_skips_duplicates() {
        let source = StaticNodeSource::new(vec![
            identity(1, "k8s-master", "10.20.0.2", "192.168.16.1"),
            identity(2, "k8s-worker1", "10.20.0.10", "192.168.16.2"),
            identity(3, "k8s-master", "10.20.0.99", "192.168.16.99"),
        ]);
        let mut store = NodeStore::new();

        let added = seed_store(&mut store, &source).await.unwrap();

        assert_eq!(added, 2);
        assert_eq!(store.get_node("k8s-master").unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_file_node_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodes.json");
        tokio::fs::write(
            &path,
            r#"[{"id": 1, "name": "k8s-master", "management_ip_address": "10.20.0.2"},
                {"id": 2, "name": "k8s-worker1", "ip_address": "192.168.16.2",
                 "management_ip_address": "10.20.0.10"}]"#,
        )
        .await
        .unwrap();

        let nodes = FileNodeSource::new(&path).list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].ip_address, "");
        assert_eq!(nodes[1].management_ip_address, "10.20.0.10");

        let missing = FileNodeSource::new(dir.path().join("absent.json"));
        assert!(matches!(missing.list_nodes().await, Err(TopoError::Io(_))));
    }
}
