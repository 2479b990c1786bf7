//! Compile-on-demand, cached by content hash, grouped by kind in a
//! deterministically ordered, atomically published sequence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use sha2::{Digest, Sha256};

use super::compiler::FilterCompiler;
use super::registry::FilterRegistry;
use super::Filter;

type Digest32 = [u8; 32];
type FilterSequence = Arc<Vec<Arc<dyn Filter>>>;

/// Compiles scripts on demand, skips recompilation when the source is
/// byte-identical to what is already loaded, and exposes a sorted,
/// atomically-published sequence per kind.
pub struct FilterLoader {
    compiler: Arc<dyn FilterCompiler>,
    registry: FilterRegistry,
    hash_by_path: Mutex<HashMap<String, Digest32>>,
    name_by_path: Mutex<HashMap<String, String>>,
    sequences: ArcSwap<HashMap<String, FilterSequence>>,
}

impl FilterLoader {
    pub fn new(compiler: Arc<dyn FilterCompiler>) -> Self {
        Self {
            compiler,
            registry: FilterRegistry::new(),
            hash_by_path: Mutex::new(HashMap::new()),
            name_by_path: Mutex::new(HashMap::new()),
            sequences: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Returns the registry backing this loader, mostly for introspection
    /// in tests and debug tooling.
    pub fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    /// Compile `source` at `path` if its digest changed since the last
    /// call; otherwise return the cached instance. On compile failure the
    /// previous instance (if any) is preserved and returned; `None` only
    /// when this path has never compiled successfully.
    pub fn get_or_create(&self, path: &str, source: &[u8]) -> Option<Arc<dyn Filter>> {
        let digest: Digest32 = Sha256::digest(source).into();

        {
            let hashes = self.hash_by_path.lock().unwrap();
            if hashes.get(path) == Some(&digest) {
                return self.current_for_path(path);
            }
        }

        match self.compiler.compile(source, path) {
            Ok(filter) => {
                self.hash_by_path.lock().unwrap().insert(path.to_string(), digest);
                let name = filter.name().to_string();
                self.name_by_path.lock().unwrap().insert(path.to_string(), name.clone());
                self.registry.put(name, filter.clone());
                self.rebuild_sequences();
                Some(filter)
            }
            Err(err) => {
                tracing::warn!(path, error = %err, "filter failed to compile, keeping previous instance");
                self.current_for_path(path)
            }
        }
    }

    fn current_for_path(&self, path: &str) -> Option<Arc<dyn Filter>> {
        let names = self.name_by_path.lock().unwrap();
        let name = names.get(path)?;
        self.registry.get(name)
    }

    /// Drop the instance loaded from `path` and invalidate its kind's
    /// sequence. A no-op if `path` was never loaded.
    pub fn remove(&self, path: &str) {
        let name = self.name_by_path.lock().unwrap().remove(path);
        self.hash_by_path.lock().unwrap().remove(path);
        if let Some(name) = name {
            self.registry.remove(&name);
            self.rebuild_sequences();
        }
    }

    /// The current sorted sequence for `kind`, or an empty sequence if
    /// nothing of that kind is loaded. Callers hold onto the returned `Arc`
    /// for the duration of one stage so a concurrent reload never mutates a
    /// sequence mid-iteration.
    pub fn filters_by_kind(&self, kind: &str) -> FilterSequence {
        self.sequences
            .load()
            .get(kind)
            .cloned()
            .unwrap_or_else(|| Arc::new(Vec::new()))
    }

    /// Recomputes every kind's sorted sequence from the registry's current
    /// contents. Callers that insert filters directly into
    /// [`FilterLoader::registry`] (native/builtin filters that bypass
    /// `get_or_create`) must call this afterwards to publish them.
    pub fn rebuild_sequences(&self) {
        let mut by_kind: HashMap<String, Vec<Arc<dyn Filter>>> = HashMap::new();
        for filter in self.registry.snapshot() {
            by_kind.entry(filter.kind().to_string()).or_default().push(filter);
        }
        for filters in by_kind.values_mut() {
            filters.sort_by(|a, b| a.order().cmp(&b.order()).then_with(|| a.name().cmp(b.name())));
        }
        let published: HashMap<String, FilterSequence> =
            by_kind.into_iter().map(|(kind, filters)| (kind, Arc::new(filters))).collect();
        self.sequences.store(Arc::new(published));
    }
}
