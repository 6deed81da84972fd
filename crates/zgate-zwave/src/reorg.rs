//! Network reorganization.
//!
//! Nodes are walked tier by tier: mains powered nodes first, then FLiRS,
//! then battery nodes, each tier starting only once the previous ones are
//! finished. Every node gets a neighbour update followed by fresh return
//! routes to the controller and to its associated nodes. A failed update
//! is queued again behind the rest of the tier, up to [`N_TRIES`] times.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use crate::engine::{RouteCallback, ZWaveEngine};
use crate::error::{Result, ZWaveError};
use crate::tree::{DataPath, DataTree};
use crate::types::{cc, CcKey, NodeId};

/// Neighbour update attempts per node, the maximum hop count of a route.
pub const N_TRIES: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Mains,
    Flirs,
    Battery,
}

impl Tier {
    const ALL: [Tier; 3] = [Tier::Mains, Tier::Flirs, Tier::Battery];

    fn index(self) -> usize {
        self as usize
    }

    fn label(self) -> &'static str {
        match self {
            Tier::Mains => "mains powered",
            Tier::Flirs => "FLiRS",
            Tier::Battery => "battery powered",
        }
    }
}

/// Progress of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReorgNode {
    pub node_id: NodeId,
    pub tier: Tier,
    pub tries: u32,
    pub done: bool,
    pub fail: bool,
}

impl ReorgNode {
    fn finished(&self) -> bool {
        self.done || self.fail
    }
}

/// One line of the reorganization log. `node_id` is 0 for run-wide entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReorgLogEntry {
    /// Unix milliseconds
    pub time: i64,
    pub node_id: NodeId,
    pub message: String,
}

#[derive(Default)]
struct ReorgState {
    run: u64,
    running: bool,
    nodes: Vec<ReorgNode>,
    started: [bool; 3],
    log: Vec<ReorgLogEntry>,
}

impl ReorgState {
    fn add_log(&mut self, node_id: NodeId, message: impl Into<String>) {
        let message = message.into();
        if node_id == 0 {
            tracing::info!("Network reorganization: {}", message);
        } else {
            tracing::info!("Network reorganization: node {} {}", node_id, message);
        }
        self.log.push(ReorgLogEntry {
            time: chrono::Utc::now().timestamp_millis(),
            node_id,
            message,
        });
    }

    fn node_mut(&mut self, node_id: NodeId) -> Option<&mut ReorgNode> {
        self.nodes.iter_mut().find(|n| n.node_id == node_id)
    }

    /// A tier without nodes counts as finished.
    fn tier_finished(&self, tier: Tier) -> bool {
        self.nodes
            .iter()
            .filter(|n| n.tier == tier)
            .all(ReorgNode::finished)
    }
}

/// Walks the network tier by tier, rebuilding routes.
pub struct NetworkReorganizer {
    this: Weak<NetworkReorganizer>,
    tree: Arc<DataTree>,
    engine: Arc<dyn ZWaveEngine>,
    state: Mutex<ReorgState>,
}

impl NetworkReorganizer {
    pub fn new(tree: Arc<DataTree>, engine: Arc<dyn ZWaveEngine>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            tree,
            engine,
            state: Mutex::new(ReorgState::default()),
        })
    }

    /// Start a new run. The log of the previous run is discarded.
    pub fn start(&self) -> Result<()> {
        let nodes = self.nodes_to_walk();
        let run = {
            let mut state = self.state.lock();
            if state.running {
                return Err(ZWaveError::Conflict(
                    "network reorganization already running".to_string(),
                ));
            }
            state.run += 1;
            state.running = true;
            state.log.clear();
            state.started = [false; 3];
            state.add_log(0, format!("Reorganization started for {} nodes", nodes.len()));
            state.nodes = nodes;
            state.run
        };
        self.check_next_step(run);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Log of the current (or last) run.
    pub fn log(&self) -> Vec<ReorgLogEntry> {
        self.state.lock().log.clone()
    }

    pub fn nodes(&self) -> Vec<ReorgNode> {
        self.state.lock().nodes.clone()
    }

    /// Every node except the controller and portable controllers, tiered.
    fn nodes_to_walk(&self) -> Vec<ReorgNode> {
        let controller = self.tree.controller_node_id();
        self.tree
            .nodes()
            .into_iter()
            .filter(|&n| Some(n) != controller)
            .filter(|&n| self.tree.int(&DataPath::device(n, "basicType")) != Some(1))
            .map(|node_id| {
                let flag = |name: &str| self.tree.flag(&DataPath::device(node_id, name));
                let tier = if flag("isListening") {
                    Tier::Mains
                } else if flag("sensor250") || flag("sensor1000") {
                    Tier::Flirs
                } else {
                    Tier::Battery
                };
                ReorgNode {
                    node_id,
                    tier,
                    tries: 0,
                    done: false,
                    fail: false,
                }
            })
            .collect()
    }

    /// Start the next tier once all earlier ones are finished. Repeats while
    /// starting a tier finishes it right away (all its nodes skipped).
    fn check_next_step(&self, run: u64) {
        loop {
            let batch: Vec<NodeId> = {
                let mut state = self.state.lock();
                if state.run != run || !state.running {
                    return;
                }
                let Some(tier) = Tier::ALL.into_iter().find(|&t| !state.tier_finished(t)) else {
                    state.running = false;
                    state.add_log(0, "Reorganization finished");
                    return;
                };
                if state.started[tier.index()] {
                    return;
                }
                state.started[tier.index()] = true;
                state.add_log(0, format!("Starting {} nodes", tier.label()));
                state
                    .nodes
                    .iter()
                    .filter(|n| n.tier == tier)
                    .map(|n| n.node_id)
                    .collect()
            };
            for node in batch {
                self.do_node(run, node);
            }
        }
    }

    fn do_node(&self, run: u64, node: NodeId) {
        if self.tree.flag(&DataPath::device(node, "isFailed")) {
            let mut state = self.state.lock();
            if state.run != run {
                return;
            }
            if let Some(n) = state.node_mut(node) {
                n.fail = true;
            }
            state.add_log(node, "is failed, skipped");
            return;
        }

        {
            let mut state = self.state.lock();
            if state.run != run {
                return;
            }
            state.add_log(node, "neighbour update started");
        }
        let weak = self.this.clone();
        self.engine.request_node_neighbour_update(
            node,
            Box::new(move |ok| {
                if let Some(reorg) = weak.upgrade() {
                    if ok {
                        reorg.node_succeeded(run, node);
                    } else {
                        reorg.node_failed(run, node);
                    }
                }
            }),
        );
    }

    fn node_succeeded(&self, run: u64, node: NodeId) {
        {
            let mut state = self.state.lock();
            if state.run != run {
                return;
            }
            if let Some(n) = state.node_mut(node) {
                n.done = true;
            }
            state.add_log(node, "neighbour update done");
        }
        self.assign_routes(node);
        self.check_next_step(run);
    }

    fn node_failed(&self, run: u64, node: NodeId) {
        let retry = {
            let mut state = self.state.lock();
            if state.run != run {
                return;
            }
            state.add_log(node, "neighbour update failed");
            match state.node_mut(node) {
                Some(n) => {
                    n.tries += 1;
                    n.fail = n.tries >= N_TRIES;
                    !n.fail
                }
                None => false,
            }
        };
        // queued behind the jobs already pending for the tier
        if retry {
            self.do_node(run, node);
        }
        self.check_next_step(run);
    }

    /// Nodes a node reports to: association groups, multi channel
    /// association groups and its wake up destination, without duplicates.
    pub fn associated_nodes(&self, node: NodeId) -> Vec<NodeId> {
        let mut targets: Vec<i64> = Vec::new();
        for instance in self.tree.instances(node) {
            let association = CcKey::new(node, instance, cc::ASSOCIATION);
            for group in self.groups(association) {
                if let Some(nodes) = self.tree.value(&DataPath::cc(association, &format!("{}.nodes", group))) {
                    targets.extend(nodes.as_int_array().unwrap_or_default());
                }
            }
            let multi = CcKey::new(node, instance, cc::MULTI_CHANNEL_ASSOCIATION);
            for group in self.groups(multi) {
                let path = DataPath::cc(multi, &format!("{}.nodesInstances", group));
                if let Some(pairs) = self.tree.value(&path) {
                    let pairs = pairs.as_int_array().unwrap_or_default();
                    targets.extend(pairs.iter().step_by(2));
                }
            }
        }
        let wakeup = CcKey::new(node, 0, cc::WAKEUP);
        if self.tree.has_command_class(wakeup) {
            targets.extend(self.tree.int(&DataPath::cc(wakeup, "nodeId")));
        }

        let mut unique: Vec<NodeId> = Vec::new();
        for target in targets {
            if let Ok(target) = NodeId::try_from(target) {
                if target > 0 && !unique.contains(&target) {
                    unique.push(target);
                }
            }
        }
        unique
    }

    fn groups(&self, key: CcKey) -> Vec<i64> {
        if !self.tree.has_command_class(key) {
            return Vec::new();
        }
        self.tree
            .numeric_children(&DataPath::cc(key, ""))
            .into_iter()
            .filter(|&g| g > 0)
            .collect()
    }

    fn assign_routes(&self, node: NodeId) {
        let report = |action: &'static str| -> RouteCallback {
            Box::new(move |ok| {
                if !ok {
                    tracing::warn!("Network reorganization: {} failed for node {}", action, node);
                }
            })
        };
        self.engine
            .delete_suc_return_route(node, report("delete SUC return route"));
        self.engine
            .delete_return_route(node, report("delete return route"));
        self.engine
            .assign_suc_return_route(node, report("assign SUC return route"));
        for target in self.associated_nodes(node) {
            self.engine
                .assign_return_route(node, target, report("assign return route"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order() {
        assert!(Tier::Mains < Tier::Flirs);
        assert!(Tier::Flirs < Tier::Battery);
        assert_eq!(Tier::ALL.map(Tier::index), [0, 1, 2]);
    }

    #[test]
    fn test_empty_tier_is_finished() {
        let state = ReorgState {
            nodes: vec![ReorgNode {
                node_id: 4,
                tier: Tier::Battery,
                tries: 0,
                done: false,
                fail: false,
            }],
            ..Default::default()
        };
        assert!(state.tier_finished(Tier::Mains));
        assert!(state.tier_finished(Tier::Flirs));
        assert!(!state.tier_finished(Tier::Battery));
    }
}
