//! Binding bookkeeping on top of the [`DataTree`].
//!
//! Everything the mapper binds for one command class is tracked in a
//! [`DataBindings`] so that it can be released in one go when the class'
//! virtual devices are torn down.

use std::sync::Arc;

use crate::tree::{BindMode, BindingId, DataPath, DataTree};
use crate::types::ChangeKind;

/// A set of data bindings released together.
#[derive(Debug, Default)]
pub struct DataBindings {
    ids: Vec<BindingId>,
}

impl DataBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `callback` to `path`. In `Value` mode the callback is also
    /// invoked once with [`ChangeKind::UPDATED`] so the current value is
    /// picked up.
    ///
    /// Returns `false` (and logs) when the holder does not exist.
    pub fn bind<F>(&mut self, tree: &DataTree, path: &DataPath, mode: BindMode, callback: F) -> bool
    where
        F: Fn(ChangeKind) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        match tree.bind(path, mode, callback.clone()) {
            Some(id) => {
                self.ids.push(id);
                if mode == BindMode::Value {
                    callback(ChangeKind::UPDATED);
                }
                true
            }
            None => {
                tracing::debug!("Cannot bind to missing data holder {}", path);
                false
            }
        }
    }

    /// Bind in `Value` mode without the initial call.
    pub fn bind_without_sync<F>(&mut self, tree: &DataTree, path: &DataPath, callback: F) -> bool
    where
        F: Fn(ChangeKind) + Send + Sync + 'static,
    {
        match tree.bind(path, BindMode::Value, Arc::new(callback)) {
            Some(id) => {
                self.ids.push(id);
                true
            }
            None => {
                tracing::debug!("Cannot bind to missing data holder {}", path);
                false
            }
        }
    }

    /// Adopt a binding made elsewhere.
    pub fn push(&mut self, id: BindingId) {
        self.ids.push(id);
    }

    /// Adopt all bindings of another set.
    pub fn extend(&mut self, other: DataBindings) {
        self.ids.extend(other.ids);
    }

    /// Release every binding. Bindings already dropped together with their
    /// holder are skipped.
    pub fn unbind_all(&mut self, tree: &DataTree) {
        for id in self.ids.drain(..) {
            tree.unbind(id);
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
