//! Process-wide table of live filter instances, keyed by name.
//!
//! The registry is the single source of truth the Processor consults
//! through the Loader's derived per-kind sequences. Writes come only from
//! the Loader (ultimately driven by the FileManager's poller); reads come
//! from request workers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::Filter;

#[derive(Default)]
pub struct FilterRegistry {
    filters: RwLock<HashMap<String, Arc<dyn Filter>>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: impl Into<String>, filter: Arc<dyn Filter>) {
        self.filters.write().unwrap().insert(name.into(), filter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.read().unwrap().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.write().unwrap().remove(name)
    }

    /// A point-in-time copy of every live filter. Cheap: clones `Arc`s, not
    /// filter bodies.
    pub fn snapshot(&self) -> Vec<Arc<dyn Filter>> {
        self.filters.read().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.filters.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
