//! Fan-in of collector reports into the node store.
//!
//! Keyed payloads arrive as unordered maps; they are sorted by key and
//! projected into slices before being stored so that node state is
//! reproducible between runs.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::collector::{CategoryPayload, NodeReport};
use crate::config::{Category, CollectorConfig};
use crate::error::{Result, TopoError};
use crate::model::ArpTable;
use crate::store::NodeStore;

/// A (node, category) fetch that produced no data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionFailure {
    pub node: String,
    pub category: Category,
    pub error: String,
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregationSummary {
    pub expected: usize,
    pub received: usize,
    pub failures: Vec<CollectionFailure>,
}

impl AggregationSummary {
    pub fn is_complete(&self) -> bool {
        self.received >= self.expected
    }

    /// Turn a short pass into [`TopoError::IncompleteCollection`].
    pub fn ensure_complete(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(TopoError::IncompleteCollection {
                expected: self.expected,
                received: self.received,
            })
        }
    }
}

pub struct Aggregator {
    categories: Vec<Category>,
    deadline: Duration,
}

impl Aggregator {
    pub fn new(categories: Vec<Category>, deadline: Duration) -> Self {
        Self {
            categories,
            deadline,
        }
    }

    pub fn from_config(config: &CollectorConfig) -> Self {
        Self::new(config.categories.clone(), config.collect_timeout)
    }

    /// Number of reports one pass over `node_count` nodes produces.
    pub fn expected(&self, node_count: usize) -> usize {
        self.categories.len() * node_count
    }

    /// Drain exactly `categories × node_names.len()` reports from `rx` and
    /// write them into `store`.
    ///
    /// Gives up when the deadline passes or every sender is dropped; whatever
    /// was stored up to then stays in the store and the returned summary is
    /// marked incomplete.
    pub async fn process(
        &self,
        store: &mut NodeStore,
        node_names: &[String],
        rx: &mut mpsc::UnboundedReceiver<NodeReport>,
    ) -> AggregationSummary {
        let mut summary = AggregationSummary {
            expected: self.expected(node_names.len()),
            ..Default::default()
        };
        let deadline = Instant::now() + self.deadline;

        while summary.received < summary.expected {
            let report = match timeout_at(deadline, rx.recv()).await {
                Ok(Some(report)) => report,
                Ok(None) => {
                    warn!(
                        expected = summary.expected,
                        received = summary.received,
                        "Report channel closed before collection completed"
                    );
                    break;
                }
                Err(_) => {
                    warn!(
                        expected = summary.expected,
                        received = summary.received,
                        timeout = ?self.deadline,
                        "Collection deadline passed"
                    );
                    break;
                }
            };
            summary.received += 1;
            self.apply(store, report, &mut summary);
        }

        summary
    }

    fn apply(&self, store: &mut NodeStore, report: NodeReport, summary: &mut AggregationSummary) {
        let NodeReport {
            node_name,
            category,
            payload,
        } = report;

        if !self.categories.contains(&category) {
            warn!(node = %node_name, %category, "Dropping report for unexpected category");
            return;
        }

        let stored = match payload {
            Ok(payload) => store_payload(store, &node_name, payload),
            Err(e) => {
                summary.failures.push(CollectionFailure {
                    node: node_name.clone(),
                    category,
                    error: e.to_string(),
                });
                clear_category(store, &node_name, category)
            }
        };

        match stored {
            Ok(()) => debug!(node = %node_name, %category, "Stored report"),
            Err(e) => warn!(node = %node_name, %category, error = %e, "Dropping report"),
        }
    }
}

fn store_payload(store: &mut NodeStore, name: &str, payload: CategoryPayload) -> Result<()> {
    match payload {
        CategoryPayload::Liveness(liveness) => store.set_node_liveness(name, Some(liveness)),
        CategoryPayload::Interfaces(table) => {
            let interfaces = sorted_by_index(table, |intf, idx| intf.if_index = idx);
            store.set_node_interfaces(name, interfaces)
        }
        CategoryPayload::BridgeDomains(table) => {
            let domains = sorted_by_index(table, |bd, idx| bd.bd_index = idx);
            store.set_node_bridge_domains(name, domains)
        }
        CategoryPayload::L2Fibs(table) => store.set_node_l2_fibs(name, sorted_by_key(table)),
        CategoryPayload::Telemetry(table) => store.set_node_telemetry(name, sorted_by_key(table)),
        CategoryPayload::IpArp(ArpTable::List(entries)) => store.set_node_ip_arps(name, entries),
        CategoryPayload::IpArp(ArpTable::Keyed(table)) => {
            store.set_node_ip_arps(name, sorted_by_key(table))
        }
    }
}

fn clear_category(store: &mut NodeStore, name: &str, category: Category) -> Result<()> {
    match category {
        Category::Liveness => store.set_node_liveness(name, None),
        Category::Interfaces => store.set_node_interfaces(name, Vec::new()),
        Category::BridgeDomains => store.set_node_bridge_domains(name, Vec::new()),
        Category::L2Fibs => store.set_node_l2_fibs(name, Vec::new()),
        Category::Telemetry => store.set_node_telemetry(name, Vec::new()),
        Category::IpArp => store.set_node_ip_arps(name, Vec::new()),
    }
}

/// Values of an index-keyed table in ascending key order. `tag` receives each
/// value with its key before it is moved into the result.
pub fn sorted_by_index<T>(table: HashMap<u32, T>, mut tag: impl FnMut(&mut T, u32)) -> Vec<T> {
    let mut entries: Vec<(u32, T)> = table.into_iter().collect();
    entries.sort_unstable_by_key(|(idx, _)| *idx);
    entries
        .into_iter()
        .map(|(idx, mut value)| {
            tag(&mut value, idx);
            value
        })
        .collect()
}

/// Values of a string-keyed table in lexicographic key order.
pub fn sorted_by_key<T>(table: HashMap<String, T>) -> Vec<T> {
    let mut entries: Vec<(String, T)> = table.into_iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().map(|(_, value)| value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::model::{NodeInterface, NodeIpArp, NodeL2Fib, NodeLiveness};

    fn store_with(names: &[&str]) -> (NodeStore, Vec<String>) {
        let mut store = NodeStore::new();
        for (i, name) in names.iter().enumerate() {
            store
                .add_node(i as u32 + 1, name, "10.0.0.1", &format!("10.20.0.{}", i + 1))
                .unwrap();
        }
        let names = store.node_names();
        (store, names)
    }

    fn interface(name: &str) -> NodeInterface {
        NodeInterface {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn fib(bd: u32) -> NodeL2Fib {
        NodeL2Fib {
            bridge_domain_idx: bd,
            ..Default::default()
        }
    }

    #[test]
    fn test_sorted_by_index_orders_numerically() {
        let table = HashMap::from([(3, "X"), (1, "Y"), (2, "Z"), (10, "W")]);
        let mut seen = Vec::new();
        let sorted = sorted_by_index(table, |_, idx| seen.push(idx));
        assert_eq!(sorted, vec!["Y", "Z", "X", "W"]);
        assert_eq!(seen, vec![1, 2, 3, 10]);
    }

    #[test]
    fn test_sorted_by_key_orders_lexicographically() {
        let table = HashMap::from([
            ("b".to_string(), 2),
            ("a".to_string(), 1),
            ("10".to_string(), 0),
        ]);
        assert_eq!(sorted_by_key(table), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_interfaces_stored_in_index_order() {
        let (mut store, names) = store_with(&["k8s-master"]);
        let aggregator = Aggregator::new(vec![Category::Interfaces], Duration::from_secs(1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let table = HashMap::from([(3, interface("X")), (1, interface("Y")), (2, interface("Z"))]);
        tx.send(NodeReport::ok("k8s-master", CategoryPayload::Interfaces(table)))
            .unwrap();

        let summary = aggregator.process(&mut store, &names, &mut rx).await;
        assert!(summary.is_complete());

        let node = store.get_node("k8s-master").unwrap();
        let order: Vec<(&str, u32)> = node
            .interfaces
            .iter()
            .map(|i| (i.name.as_str(), i.if_index))
            .collect();
        assert_eq!(order, vec![("Y", 1), ("Z", 2), ("X", 3)]);
    }

    #[tokio::test]
    async fn test_l2_fibs_stored_in_key_order() {
        let (mut store, names) = store_with(&["k8s-master"]);
        let aggregator = Aggregator::new(vec![Category::L2Fibs], Duration::from_secs(1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let table = HashMap::from([("b".to_string(), fib(2)), ("a".to_string(), fib(1))]);
        tx.send(NodeReport::ok("k8s-master", CategoryPayload::L2Fibs(table)))
            .unwrap();

        aggregator.process(&mut store, &names, &mut rx).await;

        let node = store.get_node("k8s-master").unwrap();
        assert_eq!(node.l2_fibs, vec![fib(1), fib(2)]);
    }

    #[tokio::test]
    async fn test_keyed_arp_table_stored_in_key_order() {
        let (mut store, names) = store_with(&["k8s-master"]);
        let aggregator = Aggregator::new(vec![Category::IpArp], Duration::from_secs(1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let entry = |ip: &str| NodeIpArp {
            interface: 2,
            ip_address: ip.to_string(),
            ..Default::default()
        };
        let table = HashMap::from([
            ("b".to_string(), entry("192.168.30.2")),
            ("a".to_string(), entry("192.168.30.1")),
            ("c".to_string(), entry("192.168.30.3")),
        ]);
        tx.send(NodeReport::ok("k8s-master", CategoryPayload::IpArp(ArpTable::Keyed(table))))
            .unwrap();

        let summary = aggregator.process(&mut store, &names, &mut rx).await;
        assert!(summary.is_complete());

        let node = store.get_node("k8s-master").unwrap();
        let ips: Vec<&str> = node.ip_arps.iter().map(|a| a.ip_address.as_str()).collect();
        assert_eq!(ips, vec!["192.168.30.1", "192.168.30.2", "192.168.30.3"]);
    }

    #[tokio::test]
    async fn test_process_waits_for_every_report() {
        let (mut store, names) = store_with(&["a", "b"]);
        let categories = vec![Category::Liveness, Category::L2Fibs, Category::IpArp];
        let aggregator = Aggregator::new(categories.clone(), Duration::from_secs(5));
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Interleave nodes and categories; deliver from a separate task.
        let sender = tokio::spawn(async move {
            for category in categories.iter().rev() {
                for name in ["b", "a"] {
                    let payload = match category {
                        Category::Liveness => CategoryPayload::Liveness(NodeLiveness::default()),
                        Category::L2Fibs => CategoryPayload::L2Fibs(HashMap::new()),
                        _ => CategoryPayload::IpArp(ArpTable::List(vec![])),
                    };
                    tx.send(NodeReport::ok(name, payload)).unwrap();
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            }
            tx
        });

        let summary = aggregator.process(&mut store, &names, &mut rx).await;
        assert_eq!(summary.expected, 6);
        assert_eq!(summary.received, 6);
        assert!(summary.ensure_complete().is_ok());
        assert!(store.get_node("a").unwrap().liveness.is_some());
        assert!(store.get_node("b").unwrap().liveness.is_some());

        // Nothing beyond the expected count was consumed.
        let tx = sender.await.unwrap();
        tx.send(NodeReport::failed("a", Category::Liveness, FetchError::Status(500)))
            .unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_deadline_yields_incomplete_collection() {
        let (mut store, names) = store_with(&["a", "b"]);
        let aggregator = Aggregator::new(vec![Category::Liveness], Duration::from_millis(50));
        let (tx, mut rx) = mpsc::unbounded_channel();

        tx.send(NodeReport::ok("a", CategoryPayload::Liveness(NodeLiveness::default())))
            .unwrap();

        let summary = aggregator.process(&mut store, &names, &mut rx).await;
        assert_eq!(summary.received, 1);
        assert!(matches!(
            summary.ensure_complete(),
            Err(TopoError::IncompleteCollection {
                expected: 2,
                received: 1
            })
        ));
        // Partial data is kept.
        assert!(store.get_node("a").unwrap().liveness.is_some());
        drop(tx);
    }

    #[tokio::test]
    async fn test_closed_channel_stops_early() {
        let (mut store, names) = store_with(&["a"]);
        let aggregator = Aggregator::new(vec![Category::Liveness], Duration::from_secs(30));
        let (tx, mut rx) = mpsc::unbounded_channel::<NodeReport>();
        drop(tx);

        let summary = aggregator.process(&mut store, &names, &mut rx).await;
        assert_eq!(summary.received, 0);
        assert!(!summary.is_complete());
    }

    #[tokio::test]
    async fn test_failure_clears_category_and_is_counted() {
        let (mut store, names) = store_with(&["a"]);
        store.set_node_l2_fibs("a", vec![fib(1)]).unwrap();
        let aggregator = Aggregator::new(vec![Category::L2Fibs], Duration::from_secs(1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        tx.send(NodeReport::failed(
            "a",
            Category::L2Fibs,
            FetchError::Transport("connection refused".into()),
        ))
        .unwrap();

        let summary = aggregator.process(&mut store, &names, &mut rx).await;
        assert!(summary.is_complete());
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].node, "a");
        assert_eq!(summary.failures[0].category, Category::L2Fibs);
        assert!(store.get_node("a").unwrap().l2_fibs.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_node_and_category_are_dropped() {
        let (mut store, names) = store_with(&["a"]);
        let aggregator = Aggregator::new(vec![Category::Liveness], Duration::from_millis(100));
        let (tx, mut rx) = mpsc::unbounded_channel();

        tx.send(NodeReport::ok("ghost", CategoryPayload::Liveness(NodeLiveness::default())))
            .unwrap();

        let summary = aggregator.process(&mut store, &names, &mut rx).await;
        assert!(summary.is_complete());
        assert!(store.get_node("a").unwrap().liveness.is_none());

        let (mut store, names) = store_with(&["a", "b"]);
        tx.send(NodeReport::ok("a", CategoryPayload::L2Fibs(HashMap::new())))
            .unwrap();
        tx.send(NodeReport::ok("b", CategoryPayload::Liveness(NodeLiveness::default())))
            .unwrap();
        let summary = aggregator.process(&mut store, &names, &mut rx).await;
        assert_eq!(summary.received, 2);
        assert!(store.get_node("b").unwrap().liveness.is_some());
    }
}
