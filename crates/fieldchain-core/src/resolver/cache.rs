//! Process-wide memoization of resolved instances, compiled leaves and pipelines
//!
//! Entries are keyed in two layers. The entry key identifies a resolved node
//! configuration (identity plus constructor arguments, or record type plus method)
//! and owns at most one backing instance. Inside an entry, compiled leaf callables
//! are keyed by call arguments, so declarations that differ only in call arguments
//! share the instance but get their own wrapper.
//!
//! Concurrent first use may compute a value twice; only the first stored value is
//! ever handed out. Booting is serialized per instance: callers that arrive while a
//! boot is running wait for it to finish.
//!
//! Object arguments are keyed by address, so an entry keeps the constructor
//! arguments it was keyed by alive for as long as the entry exists.
//!
//! Copyright (c) 2025 Fieldchain Team
//! Licensed under the Apache-2.0 license

use crate::args::Arg;
use crate::error::Result;
use crate::node::{Callable, Transform};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

static GLOBAL: OnceLock<Arc<NodeCache>> = OnceLock::new();

#[derive(Default)]
struct CacheEntry {
    instance: Option<Arc<dyn Transform>>,
    compiled: HashMap<String, Callable>,
    retained: Vec<Arg>,
}

#[derive(Default)]
struct BootCell {
    done: AtomicBool,
    running: Mutex<()>,
}

/// Memoization cache shared by all records of all types
#[derive(Default)]
pub struct NodeCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    booted: Mutex<HashMap<usize, Arc<BootCell>>>,
    pipelines: Mutex<HashMap<String, Callable>>,
    instantiations: AtomicUsize,
}

/// Introspection view of one cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntrySnapshot {
    pub key: String,
    pub has_instance: bool,
    /// Call-argument keys with a compiled wrapper, sorted
    pub compiled: Vec<String>,
}

/// Introspection view of the whole cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Sorted by key
    pub entries: Vec<CacheEntrySnapshot>,
    /// Sorted pipeline keys
    pub pipelines: Vec<String>,
    pub booted: usize,
    pub instantiations: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn instance_id(instance: &Arc<dyn Transform>) -> usize {
    Arc::as_ptr(instance) as *const () as usize
}

impl NodeCache {
    /// A fresh, empty cache (one per test, or one per isolated engine)
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache
    pub fn global() -> Arc<NodeCache> {
        GLOBAL.get_or_init(|| Arc::new(NodeCache::new())).clone()
    }

    pub fn instance(&self, key: &str) -> Option<Arc<dyn Transform>> {
        lock(&self.entries).get(key).and_then(|entry| entry.instance.clone())
    }

    /// Store `instance` unless one is already cached; returns the cached one
    pub fn store_instance(&self, key: &str, instance: Arc<dyn Transform>) -> Arc<dyn Transform> {
        let mut entries = lock(&self.entries);
        let entry = entries.entry(key.to_string()).or_default();
        entry.instance.get_or_insert(instance).clone()
    }

    /// Keep the constructor arguments behind `key` alive with its entry
    pub fn retain_args(&self, key: &str, args: &[Arg]) {
        let mut entries = lock(&self.entries);
        let entry = entries.entry(key.to_string()).or_default();
        if entry.retained.is_empty() {
            entry.retained = args.to_vec();
        }
    }

    pub fn compiled(&self, key: &str, args_key: &str) -> Option<Callable> {
        lock(&self.entries)
            .get(key)
            .and_then(|entry| entry.compiled.get(args_key).cloned())
    }

    /// Store a compiled leaf unless one is already cached; returns the cached one
    pub fn store_compiled(&self, key: &str, args_key: &str, callable: Callable) -> Callable {
        let mut entries = lock(&self.entries);
        let entry = entries.entry(key.to_string()).or_default();
        entry
            .compiled
            .entry(args_key.to_string())
            .or_insert(callable)
            .clone()
    }

    /// Run `boot` for `instance` unless an earlier boot completed.
    ///
    /// Concurrent callers block until the running boot returns. A failed boot leaves
    /// the instance unbooted, so the next caller tries again. Returns whether `boot`
    /// ran and succeeded in this call.
    pub fn boot_once(
        &self,
        instance: &Arc<dyn Transform>,
        boot: impl FnOnce() -> Result<()>,
    ) -> Result<bool> {
        let cell = lock(&self.booted)
            .entry(instance_id(instance))
            .or_default()
            .clone();
        if cell.done.load(Ordering::Acquire) {
            return Ok(false);
        }
        let _running = lock(&cell.running);
        if cell.done.load(Ordering::Acquire) {
            return Ok(false);
        }
        boot()?;
        cell.done.store(true, Ordering::Release);
        Ok(true)
    }

    /// Forget the boot state of an instance
    pub fn unmark_booted(&self, instance: &Arc<dyn Transform>) {
        lock(&self.booted).remove(&instance_id(instance));
    }

    pub fn is_booted(&self, instance: &Arc<dyn Transform>) -> bool {
        lock(&self.booted)
            .get(&instance_id(instance))
            .is_some_and(|cell| cell.done.load(Ordering::Acquire))
    }

    pub fn pipeline(&self, key: &str) -> Option<Callable> {
        lock(&self.pipelines).get(key).cloned()
    }

    /// Store a compiled pipeline unless one is already cached; returns the cached one
    pub fn store_pipeline(&self, key: &str, pipeline: Callable) -> Callable {
        lock(&self.pipelines)
            .entry(key.to_string())
            .or_insert(pipeline)
            .clone()
    }

    pub(crate) fn record_instantiation(&self) {
        self.instantiations.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of node instances created through the factory since the last clear
    pub fn instantiations(&self) -> usize {
        self.instantiations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Current contents, for debugging and tests
    pub fn dump(&self) -> CacheSnapshot {
        let mut entries: Vec<CacheEntrySnapshot> = lock(&self.entries)
            .iter()
            .map(|(key, entry)| {
                let mut compiled: Vec<String> = entry.compiled.keys().cloned().collect();
                compiled.sort();
                CacheEntrySnapshot {
                    key: key.clone(),
                    has_instance: entry.instance.is_some(),
                    compiled,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        let mut pipelines: Vec<String> = lock(&self.pipelines).keys().cloned().collect();
        pipelines.sort();

        CacheSnapshot {
            entries,
            pipelines,
            booted: lock(&self.booted)
                .values()
                .filter(|cell| cell.done.load(Ordering::Acquire))
                .count(),
            instantiations: self.instantiations(),
        }
    }

    /// Drop everything, including boot marks and compiled pipelines
    pub fn clear(&self) {
        lock(&self.entries).clear();
        lock(&self.pipelines).clear();
        lock(&self.booted).clear();
        self.instantiations.store(0, Ordering::SeqCst);
        log::debug!("node cache cleared");
    }

    /// Drop one entry. Pipelines built from it keep their own handles, so they are
    /// dropped too. Returns whether the key existed.
    pub fn clear_key(&self, key: &str) -> bool {
        let removed = lock(&self.entries).remove(key);
        if let Some(instance) = removed.as_ref().and_then(|entry| entry.instance.as_ref()) {
            self.unmark_booted(instance);
        }
        if removed.is_some() {
            lock(&self.pipelines).clear();
            log::debug!("node cache entry `{}` cleared", key);
        }
        removed.is_some()
    }
}
