//! ---
//! drover_section: "04-configuration-orchestration"
//! drover_subsection: "module"
//! drover_type: "source"
//! drover_scope: "code"
//! drover_description: "Thread-safe, change-tracked string parameter map."
//! drover_version: "v0.0.0-prealpha"
//! drover_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::ConfigError;

/// Handle returned by [`ConfigMap::add_listener`], used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&ConfigMap) + Send + Sync>;

/// A concurrently accessible parameter map holding both keys and values as
/// strings.
///
/// An atomic revision counter tracks updates so that interested consumers can
/// determine when to re-read values across threads. Every logical mutation
/// (single put, remove, clear, or batch merge) bumps the revision exactly
/// once and then synchronously invokes every registered listener in
/// registration order, with a reference to the whole map.
///
/// Cloning a `ConfigMap` produces another handle to the same underlying map.
///
/// Listeners run on the mutating thread while the per-map mutation lock is
/// held; they may read the map freely but must not mutate it.
#[derive(Clone, Default)]
pub struct ConfigMap {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: RwLock<IndexMap<String, String>>,
    revision: AtomicU64,
    // Serializes writers and keeps listener callbacks ordered with respect
    // to the mutations that triggered them. Never held while `entries` is
    // locked for read by a listener.
    mutation: Mutex<()>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
}

impl ConfigMap {
    /// Create an empty map at revision zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map seeded from the given entries, as one logical mutation.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = Self::new();
        map.put_all(entries);
        map
    }

    /// Parse a `key=value;key2=value2;` encoded parameter string.
    ///
    /// Empty segments are ignored; a segment without `=` yields `None`.
    pub fn parse_params(encoded: &str) -> Option<Self> {
        let mut parsed: Vec<(String, String)> = Vec::new();
        for segment in encoded.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=')?;
            parsed.push((key.trim().to_owned(), value.trim().to_owned()));
        }
        Some(Self::from_entries(parsed))
    }

    /// Current revision. Starts at zero and increments by exactly one per
    /// logical mutation.
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::Acquire)
    }

    /// Read a value. Absent keys are not an error.
    pub fn get(&self, key: &str) -> Option<String> {
        trace!(key, "getting parameter");
        self.inner.entries.read().get(key).cloned()
    }

    /// Read a value, falling back to a default for absent keys.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.read().contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set one parameter, bump the revision, and notify listeners.
    pub fn set<V: ToString>(&self, key: &str, value: V) {
        let value = value.to_string();
        let _guard = self.inner.mutation.lock();
        debug!(key, %value, "setting param");
        self.inner.entries.write().insert(key.to_owned(), value);
        self.mark_mutation();
    }

    /// Set one parameter without bumping the revision or notifying anyone.
    ///
    /// Used to seed derived values where an update storm is undesirable.
    pub fn set_silently<V: ToString>(&self, key: &str, value: V) {
        let value = value.to_string();
        let _guard = self.inner.mutation.lock();
        trace!(key, %value, "setting param silently");
        self.inner.entries.write().insert(key.to_owned(), value);
    }

    /// Remove one parameter, returning the previous value if any.
    pub fn remove(&self, key: &str) -> Option<String> {
        let _guard = self.inner.mutation.lock();
        trace!(key, "removing param");
        let removed = self.inner.entries.write().shift_remove(key);
        self.mark_mutation();
        removed
    }

    /// Remove all parameters as one logical mutation.
    pub fn clear(&self) {
        let _guard = self.inner.mutation.lock();
        debug!("parameter map cleared");
        self.inner.entries.write().clear();
        self.mark_mutation();
    }

    /// Merge all given entries as one logical mutation: listeners observe a
    /// single revision bump after every entry is applied.
    pub fn put_all<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let _guard = self.inner.mutation.lock();
        {
            let mut map = self.inner.entries.write();
            for (key, value) in entries {
                map.insert(key.into(), value.into());
            }
        }
        self.mark_mutation();
    }

    /// Copy of the current entries, in insertion order.
    pub fn snapshot(&self) -> IndexMap<String, String> {
        self.inner.entries.read().clone()
    }

    /// Render the current entries as a JSON object string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_owned())
    }

    /// Register a listener invoked synchronously after every mutation, in
    /// registration order.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ConfigMap) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Deregister a listener. Returns false when the id was unknown.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Typed read: unsigned integer, accepting SI suffixes via the count
    /// grammar.
    pub fn get_count(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.coerce(key, "count", |v| drover_common::long_count_for(v))
    }

    /// Typed read: u64.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.coerce(key, "u64", |v| v.parse::<u64>().ok())
    }

    /// Typed read: i64.
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        self.coerce(key, "i64", |v| v.parse::<i64>().ok())
    }

    /// Typed read: f64.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, ConfigError> {
        self.coerce(key, "f64", |v| v.parse::<f64>().ok())
    }

    /// Typed read: bool (`true`/`false`, case-insensitive).
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.coerce(key, "bool", |v| v.to_ascii_lowercase().parse::<bool>().ok())
    }

    fn coerce<T>(
        &self,
        key: &str,
        wanted: &'static str,
        parse: impl Fn(&str) -> Option<T>,
    ) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => match parse(&value) {
                Some(parsed) => Ok(Some(parsed)),
                None => Err(ConfigError::Parse {
                    key: key.to_owned(),
                    value,
                    wanted,
                }),
            },
        }
    }

    // Caller must hold the mutation lock.
    fn mark_mutation(&self) {
        self.inner.revision.fetch_add(1, Ordering::AcqRel);
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        trace!(count = listeners.len(), "calling listeners");
        for listener in listeners {
            listener(self);
        }
    }
}

impl std::fmt::Debug for ConfigMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})/{:?}", self.revision(), self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn revision_increments_once_per_mutation() {
        let map = ConfigMap::new();
        assert_eq!(map.revision(), 0);
        map.set("a", "1");
        assert_eq!(map.revision(), 1);
        map.set("a", "2");
        assert_eq!(map.revision(), 2);
        map.remove("a");
        assert_eq!(map.revision(), 3);
        map.clear();
        assert_eq!(map.revision(), 4);
    }

    #[test]
    fn put_all_is_one_revision_bump() {
        let map = ConfigMap::new();
        map.put_all([("a", "1"), ("b", "2"), ("c", "3")]);
        assert_eq!(map.revision(), 1);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn set_silently_does_not_bump_or_notify() {
        let map = ConfigMap::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let observed = fired.clone();
        map.add_listener(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        map.set_silently("a", "1");
        assert_eq!(map.revision(), 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(map.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn listeners_fire_in_registration_order() {
        let map = ConfigMap::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            map.add_listener(move |_| order.lock().push(tag));
        }
        map.set("x", "y");
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn listeners_observe_completed_batch() {
        let map = ConfigMap::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let capture = seen.clone();
        map.add_listener(move |m| {
            capture.lock().push((m.len(), m.revision()));
        });
        map.put_all([("a", "1"), ("b", "2")]);
        assert_eq!(*seen.lock(), vec![(2, 1)]);
    }

    #[test]
    fn removed_listener_stops_firing() {
        let map = ConfigMap::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let observed = fired.clone();
        let id = map.add_listener(move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        map.set("a", "1");
        assert!(map.remove_listener(id));
        map.set("a", "2");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!map.remove_listener(id));
    }

    #[test]
    fn typed_accessors_parse_on_read() {
        let map = ConfigMap::from_entries([("n", "42"), ("f", "1.5"), ("b", "True"), ("c", "5k")]);
        assert_eq!(map.get_u64("n").unwrap(), Some(42));
        assert_eq!(map.get_f64("f").unwrap(), Some(1.5));
        assert_eq!(map.get_bool("b").unwrap(), Some(true));
        assert_eq!(map.get_count("c").unwrap(), Some(5_000));
        assert_eq!(map.get_u64("missing").unwrap(), None);
    }

    #[test]
    fn typed_accessors_surface_parse_errors() {
        let map = ConfigMap::from_entries([("n", "forty-two")]);
        let err = map.get_u64("n").unwrap_err();
        assert_eq!(
            err,
            ConfigError::Parse {
                key: "n".to_owned(),
                value: "forty-two".to_owned(),
                wanted: "u64",
            }
        );
    }

    #[test]
    fn parse_params_round_trips() {
        let map = ConfigMap::parse_params("alias=demo; cycles=0..100 ;threads=4;").unwrap();
        assert_eq!(map.get("alias").as_deref(), Some("demo"));
        assert_eq!(map.get("cycles").as_deref(), Some("0..100"));
        assert_eq!(map.get("threads").as_deref(), Some("4"));
        assert!(ConfigMap::parse_params("no-equals-here").is_none());
    }

    #[test]
    fn handles_share_one_map() {
        let map = ConfigMap::new();
        let other = map.clone();
        map.set("k", "v");
        assert_eq!(other.get("k").as_deref(), Some("v"));
        assert_eq!(other.revision(), 1);
    }
}
