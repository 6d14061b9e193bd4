//! One collection pass: collect, aggregate, validate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator::{Aggregator, CollectionFailure};
use crate::collector::Collector;
use crate::config::{CollectorConfig, ValidatorConfig};
use crate::error::Result;
use crate::model::Node;
use crate::store::NodeStore;
use crate::validator::Validator;

/// Outcome of a [`TopologyRun`], serialized as the CLI output.
#[derive(Debug, Clone, Serialize)]
pub struct TopologyReport {
    pub run_id: Uuid,
    pub collected_at: DateTime<Utc>,
    pub expected: usize,
    pub received: usize,
    pub complete: bool,
    pub failures: Vec<CollectionFailure>,
    pub valid: bool,
    pub unconfirmed: Vec<String>,
    pub missing_loopback: Vec<String>,
    pub errors: BTreeMap<String, Vec<String>>,
    pub nodes: Vec<Node>,
}

impl TopologyReport {
    /// Every report arrived and the loopback check passed.
    pub fn is_healthy(&self) -> bool {
        self.complete && self.valid
    }
}

pub struct TopologyRun {
    collector: Collector,
    aggregator: Aggregator,
    validator: Validator,
}

impl TopologyRun {
    pub fn new(collector: Collector, aggregator: Aggregator, validator: Validator) -> Self {
        Self {
            collector,
            aggregator,
            validator,
        }
    }

    pub fn from_config(collector: CollectorConfig, validator: ValidatorConfig) -> Result<Self> {
        let aggregator = Aggregator::from_config(&collector);
        Ok(Self::new(
            Collector::new(collector)?,
            aggregator,
            Validator::new(validator),
        ))
    }

    /// Run one pass over every node in `store`.
    ///
    /// The validator only sees the store once aggregation has returned;
    /// reports still in flight after the deadline are discarded.
    pub async fn run(&self, store: &mut NodeStore) -> TopologyReport {
        let run_id = Uuid::new_v4();
        let collected_at = Utc::now();
        store.clear_error_report();

        let node_names = store.node_names();
        info!(%run_id, nodes = node_names.len(), "Starting collection");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatched = self.collector.collect(&store.get_all_nodes(), &tx);
        // Only the fetch tasks hold senders from here on.
        drop(tx);

        let summary = self.aggregator.process(store, &node_names, &mut rx).await;
        if let Err(e) = summary.ensure_complete() {
            warn!(%run_id, dispatched, error = %e, "Continuing with partial data");
        }
        drop(rx);

        let outcome = self.validator.validate(store, &node_names);
        info!(
            %run_id,
            received = summary.received,
            failures = summary.failures.len(),
            valid = outcome.valid,
            "Collection finished"
        );

        TopologyReport {
            run_id,
            collected_at,
            expected: summary.expected,
            received: summary.received,
            complete: summary.is_complete(),
            failures: summary.failures,
            valid: outcome.valid,
            unconfirmed: outcome.unconfirmed,
            missing_loopback: outcome.missing_loopback,
            errors: store.error_report().clone(),
            nodes: store.get_all_nodes().into_iter().cloned().collect(),
        }
    }
}
