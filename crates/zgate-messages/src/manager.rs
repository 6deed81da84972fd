//! Notification manager.
//!
//! Keeps a bounded in-memory history and broadcasts every notification to
//! live subscribers.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::{Notification, NotificationCategory, NotificationId, NotificationSeverity};

/// Default number of notifications kept in memory.
pub const DEFAULT_HISTORY: usize = 500;

/// Fire-and-forget notification emission.
pub trait NotificationSink: Send + Sync {
    /// Deliver a fully built notification.
    fn push(&self, notification: Notification);

    /// Build and deliver a notification.
    fn notify(
        &self,
        severity: NotificationSeverity,
        message: &str,
        category: NotificationCategory,
    ) {
        self.push(Notification::new(severity, message, category));
    }
}

/// Notification statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationStats {
    pub total: usize,
    pub by_category: Vec<(String, usize)>,
    pub errors: usize,
}

/// In-memory notification manager.
#[derive(Clone)]
pub struct NotificationManager {
    history: Arc<RwLock<VecDeque<Notification>>>,
    capacity: usize,
    tx: broadcast::Sender<Notification>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            history: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
            tx,
        }
    }

    /// Subscribe to notifications emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn get(&self, id: &NotificationId) -> Result<Notification> {
        self.history
            .read()
            .iter()
            .find(|n| &n.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// All retained notifications, oldest first.
    pub fn list(&self) -> Vec<Notification> {
        self.history.read().iter().cloned().collect()
    }

    pub fn list_by_category(&self, category: NotificationCategory) -> Vec<Notification> {
        self.history
            .read()
            .iter()
            .filter(|n| n.category == category)
            .cloned()
            .collect()
    }

    pub fn list_by_min_severity(&self, severity: NotificationSeverity) -> Vec<Notification> {
        self.history
            .read()
            .iter()
            .filter(|n| n.severity >= severity)
            .cloned()
            .collect()
    }

    pub fn delete(&self, id: &NotificationId) -> Result<()> {
        let mut history = self.history.write();
        let before = history.len();
        history.retain(|n| &n.id != id);
        if history.len() == before {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn clear(&self) {
        self.history.write().clear();
    }

    pub fn stats(&self) -> NotificationStats {
        let history = self.history.read();
        let mut by_category: Vec<(String, usize)> = Vec::new();
        for n in history.iter() {
            match by_category.iter_mut().find(|(c, _)| c == n.category.as_str()) {
                Some((_, count)) => *count += 1,
                None => by_category.push((n.category.as_str().to_string(), 1)),
            }
        }
        NotificationStats {
            total: history.len(),
            by_category,
            errors: history
                .iter()
                .filter(|n| n.severity >= NotificationSeverity::Error)
                .count(),
        }
    }
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for NotificationManager {
    fn push(&self, notification: Notification) {
        match notification.severity {
            NotificationSeverity::Info => tracing::info!("{}", notification.summary()),
            NotificationSeverity::Warning => tracing::warn!("{}", notification.summary()),
            _ => tracing::error!("{}", notification.summary()),
        }

        {
            let mut history = self.history.write();
            if history.len() >= self.capacity {
                history.pop_front();
            }
            history.push_back(notification.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(notification);
    }
}
