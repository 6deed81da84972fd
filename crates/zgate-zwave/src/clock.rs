//! Daily clock synchronisation of nodes with a Clock or TimeParameters class.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::engine::{CcCommand, CcRequest, ZWaveEngine};
use crate::tree::DataTree;
use crate::types::{cc, CcKey};

pub struct TimeSync {
    this: Weak<TimeSync>,
    tree: Arc<DataTree>,
    engine: Arc<dyn ZWaveEngine>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TimeSync {
    pub fn new(tree: Arc<DataTree>, engine: Arc<dyn ZWaveEngine>, interval: Duration) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            tree,
            engine,
            interval,
            task: Mutex::new(None),
        })
    }

    pub fn start(&self) {
        let mut task = self.task.lock();
        if task.is_some() || self.interval.is_zero() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime, time synchronisation not scheduled");
            return;
        };
        let weak = self.this.clone();
        let period = self.interval;
        *task = Some(handle.spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.tick().await;
            loop {
                timer.tick().await;
                match weak.upgrade() {
                    Some(sync) => {
                        sync.sync_all();
                    }
                    None => break,
                }
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    /// Send the current time to every node except the controller. Returns
    /// the number of requests queued.
    pub fn sync_all(&self) -> usize {
        let controller = self.tree.controller_node_id();
        let mut sent = 0;
        for node in self.tree.nodes() {
            if Some(node) == controller {
                continue;
            }
            for (class, command) in [
                (cc::TIME_PARAMETERS, CcCommand::TimeParametersSet),
                (cc::CLOCK, CcCommand::ClockSet),
            ] {
                let key = CcKey::new(node, 0, class);
                if !self.tree.has_command_class(key) {
                    continue;
                }
                match self.engine.send(CcRequest::new(key, command)) {
                    Ok(()) => sent += 1,
                    Err(e) => tracing::warn!("Time update of {} failed: {}", key, e),
                }
            }
        }
        tracing::debug!("Queued {} time updates", sent);
        sent
    }
}

impl Drop for TimeSync {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}
