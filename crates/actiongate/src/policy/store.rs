//! Ordered, keyed collection of policy entries.
//!
//! The store publishes immutable [`PolicySnapshot`]s through an [`ArcSwap`].
//! Readers load the current snapshot once per call and evaluate against it
//! without locking; writers build a new entry list and swap it in, so a reader
//! observes either the pre- or the post-mutation list and never a partial one.
//!
//! # Example
//!
//! ```ignore
//! use actiongate::policy::store::PolicyStore;
//!
//! let store = PolicyStore::new();
//! store.upsert(entry);
//!
//! let snapshot = store.snapshot();
//! for entry in snapshot.find_by_session(&session, &matcher) {
//!     // ...
//! }
//! ```

use std::sync::Arc;

use arc_swap::ArcSwap;
use time::OffsetDateTime;

use crate::policy::entry::{ActionSpec, PolicyEntry, PolicyKey};
use crate::policy::matcher::SessionMatcher;
use crate::policy::pattern::ActionName;
use crate::policy::reload::{PolicyChange, PolicyChangeNotifier};
use crate::policy::session::Session;

// =============================================================================
// Snapshot
// =============================================================================

/// Immutable view of the store at one version.
#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    entries: Vec<Arc<PolicyEntry>>,
    version: u64,
    last_modified: OffsetDateTime,
}

impl Default for PolicySnapshot {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            version: 0,
            last_modified: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

/// An entry together with the pattern that resolved an action within it.
#[derive(Debug, Clone)]
pub struct ActionMatch {
    /// The entry.
    pub entry: Arc<PolicyEntry>,
    /// First pattern present in the entry's action table.
    pub pattern: String,
}

impl ActionMatch {
    /// The spec the pattern resolved to.
    #[must_use]
    pub fn spec(&self) -> Option<&ActionSpec> {
        self.entry.action(&self.pattern)
    }
}

impl PolicySnapshot {
    /// Entries in store order.
    #[must_use]
    pub fn entries(&self) -> &[Arc<PolicyEntry>] {
        &self.entries
    }

    /// Snapshot version. Incremented by every successful mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Time of the mutation that produced this snapshot.
    #[must_use]
    pub fn last_modified(&self) -> OffsetDateTime {
        self.last_modified
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the snapshot holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the entry with the given key.
    #[must_use]
    pub fn find_by_key(&self, key: &PolicyKey) -> Option<usize> {
        self.entries.iter().position(|e| &e.key == key)
    }

    /// The entry with the given key.
    #[must_use]
    pub fn get(&self, key: &PolicyKey) -> Option<&Arc<PolicyEntry>> {
        self.entries.iter().find(|e| &e.key == key)
    }

    /// Entries whose session condition matches `session`, in store order.
    pub fn find_by_session<'a>(
        &'a self,
        session: &'a Session,
        matcher: &'a SessionMatcher,
    ) -> impl Iterator<Item = &'a Arc<PolicyEntry>> + 'a {
        self.entries
            .iter()
            .filter(move |e| matcher.matches(&e.session, session))
    }

    /// Entries that grant `action` in some form, regardless of session.
    ///
    /// For every entry the first present candidate pattern is resolved; the
    /// entry is reported when that spec is not a deny.
    #[must_use]
    pub fn find_by_action(&self, action: &ActionName) -> Vec<ActionMatch> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let (pattern, spec) = action.first_match(|p| entry.action(p))?;
                spec.is_grant().then(|| ActionMatch {
                    entry: Arc::clone(entry),
                    pattern,
                })
            })
            .collect()
    }

    /// Total number of action patterns across all entries.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.entries.iter().map(|e| e.actions.len()).sum()
    }

    fn successor(&self, entries: Vec<Arc<PolicyEntry>>) -> Self {
        Self {
            entries,
            version: self.version + 1,
            last_modified: OffsetDateTime::now_utc(),
        }
    }
}

// =============================================================================
// Store Statistics
// =============================================================================

/// Point-in-time statistics about the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStoreStats {
    /// Number of entries.
    pub entry_count: usize,
    /// Total action patterns across entries.
    pub pattern_count: usize,
    /// Current snapshot version.
    pub version: u64,
    /// Time of the last mutation.
    pub last_modified: OffsetDateTime,
}

// =============================================================================
// Policy Store
// =============================================================================

/// Thread-safe policy collection with copy-on-write snapshots.
pub struct PolicyStore {
    current: ArcSwap<PolicySnapshot>,
    notifier: Option<Arc<PolicyChangeNotifier>>,
}

impl std::fmt::Debug for PolicyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("PolicyStore")
            .field("entries", &snapshot.len())
            .field("version", &snapshot.version())
            .finish()
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(PolicySnapshot::default()),
            notifier: None,
        }
    }

    /// Create a store pre-populated with `entries`.
    ///
    /// Duplicate keys collapse by the upsert rule.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = PolicyEntry>) -> Self {
        let store = Self::new();
        store.replace_all(entries);
        store
    }

    /// Attach a change notifier. Every subsequent mutation is announced on it.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<PolicyChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// The current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.current.load_full()
    }

    /// Current version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.current.load().version()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Insert an entry, replacing in place any entry with the same key.
    ///
    /// A new key is appended, so store order is first-insertion order.
    pub fn upsert(&self, entry: PolicyEntry) -> Arc<PolicyEntry> {
        let entry = Arc::new(entry);
        let mut replaced = false;
        let mut version = 0;

        self.current.rcu(|current| {
            let mut entries = current.entries.clone();
            match current.find_by_key(&entry.key) {
                Some(idx) => {
                    entries[idx] = Arc::clone(&entry);
                    replaced = true;
                }
                None => {
                    entries.push(Arc::clone(&entry));
                    replaced = false;
                }
            }
            let next = current.successor(entries);
            version = next.version;
            next
        });

        tracing::info!(
            policy_key = %entry.key,
            replaced = replaced,
            version = version,
            "Policy upserted"
        );
        self.notify(PolicyChange::Upserted {
            key: entry.key.clone(),
            version,
        });

        entry
    }

    /// Remove the entry with `key`. Returns `false` if no such entry exists.
    pub fn remove(&self, key: &PolicyKey) -> bool {
        let mut removed = false;
        let mut version = 0;

        self.current.rcu(|current| match current.find_by_key(key) {
            Some(idx) => {
                let mut entries = current.entries.clone();
                entries.remove(idx);
                let next = current.successor(entries);
                removed = true;
                version = next.version;
                Arc::new(next)
            }
            None => {
                removed = false;
                Arc::clone(current)
            }
        });

        if removed {
            tracing::info!(policy_key = %key, version = version, "Policy removed");
            self.notify(PolicyChange::Removed {
                key: key.clone(),
                version,
            });
        } else {
            tracing::debug!(policy_key = %key, "Policy not found for removal");
        }

        removed
    }

    /// Atomically replace every entry.
    ///
    /// Later duplicates of a key replace earlier ones in place.
    pub fn replace_all(&self, entries: impl IntoIterator<Item = PolicyEntry>) {
        let mut collected: Vec<Arc<PolicyEntry>> = Vec::new();
        for entry in entries {
            match collected.iter().position(|e| e.key == entry.key) {
                Some(idx) => collected[idx] = Arc::new(entry),
                None => collected.push(Arc::new(entry)),
            }
        }

        let count = collected.len();
        let mut version = 0;
        self.current.rcu(|current| {
            let next = current.successor(collected.clone());
            version = next.version;
            next
        });

        tracing::info!(entries = count, version = version, "Policy set replaced");
        self.notify(PolicyChange::Reloaded {
            entries: count,
            version,
        });
    }

    /// Position of the entry with `key` in the current snapshot.
    #[must_use]
    pub fn find_by_key(&self, key: &PolicyKey) -> Option<usize> {
        self.current.load().find_by_key(key)
    }

    /// The entry with `key`, if present.
    #[must_use]
    pub fn get(&self, key: &PolicyKey) -> Option<Arc<PolicyEntry>> {
        self.current.load().get(key).cloned()
    }

    /// Entries matching `session`, in store order.
    #[must_use]
    pub fn find_by_session(&self, session: &Session) -> Vec<Arc<PolicyEntry>> {
        let matcher = SessionMatcher::new();
        self.current
            .load()
            .find_by_session(session, &matcher)
            .cloned()
            .collect()
    }

    /// Entries granting `action` in some form. See [`PolicySnapshot::find_by_action`].
    #[must_use]
    pub fn find_by_action(&self, action: &ActionName) -> Vec<ActionMatch> {
        self.current.load().find_by_action(action)
    }

    /// Store statistics.
    #[must_use]
    pub fn stats(&self) -> PolicyStoreStats {
        let snapshot = self.current.load();
        PolicyStoreStats {
            entry_count: snapshot.len(),
            pattern_count: snapshot.pattern_count(),
            version: snapshot.version(),
            last_modified: snapshot.last_modified(),
        }
    }

    fn notify(&self, change: PolicyChange) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(change);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
