//! Policy hot-reload from a declarative source.
//!
//! # Architecture
//!
//! - [`PolicyChange`] - Events describing store mutations and reload requests
//! - [`PolicyChangeNotifier`] - Broadcast channel for change notifications
//! - [`PolicySource`] - Where policy documents come from
//! - [`PolicyReloadService`] - Reloads the store with debouncing and retry
//!
//! The service only reacts to [`PolicyChange::BulkReload`] requests. Store
//! mutations are announced on the same channel for observers but never
//! trigger a reload themselves, so a reload cannot clobber a local upsert
//! that has not reached the source yet.
//!
//! # Example
//!
//! ```ignore
//! use actiongate::policy::reload::{
//!     FilePolicySource, PolicyChangeNotifier, PolicyReloadService, ReloadConfig,
//! };
//! use std::sync::Arc;
//!
//! let notifier = Arc::new(PolicyChangeNotifier::new(64));
//! let store = Arc::new(PolicyStore::new().with_notifier(notifier.clone()));
//! let source = Arc::new(FilePolicySource::new("policies.json"));
//!
//! let service = Arc::new(PolicyReloadService::new(
//!     store,
//!     source,
//!     notifier.clone(),
//!     ReloadConfig::default(),
//! ));
//! service.reload_with_retry().await?;
//!
//! let handle = tokio::spawn({
//!     let service = service.clone();
//!     async move { service.run().await }
//! });
//!
//! service.trigger_reload();
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Notify, broadcast};
use tokio::time::{Duration, Instant};

use crate::policy::entry::PolicyKey;
use crate::policy::resources::{PolicyDocument, PolicySet, to_policy_entries};
use crate::policy::store::PolicyStore;
use crate::{AclError, AclResult};

// =============================================================================
// Policy Change Types
// =============================================================================

/// Policy change events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyChange {
    /// An entry was inserted or replaced.
    Upserted {
        /// Key of the entry.
        key: PolicyKey,
        /// Store version the upsert produced.
        version: u64,
    },
    /// An entry was removed.
    Removed {
        /// Key of the removed entry.
        key: PolicyKey,
        /// Store version the removal produced.
        version: u64,
    },
    /// The whole policy set was replaced.
    Reloaded {
        /// Number of entries after the replacement.
        entries: usize,
        /// Store version the replacement produced.
        version: u64,
    },
    /// Request to reload all policies from the source.
    BulkReload,
}

impl PolicyChange {
    /// Get the policy key if this is a single-entry change.
    #[must_use]
    pub fn key(&self) -> Option<&PolicyKey> {
        match self {
            Self::Upserted { key, .. } | Self::Removed { key, .. } => Some(key),
            Self::Reloaded { .. } | Self::BulkReload => None,
        }
    }

    /// Check if this is a reload request.
    #[must_use]
    pub fn is_bulk_reload(&self) -> bool {
        matches!(self, Self::BulkReload)
    }
}

// =============================================================================
// Policy Change Notifier
// =============================================================================

/// Broadcast channel for policy change notifications.
pub struct PolicyChangeNotifier {
    sender: broadcast::Sender<PolicyChange>,
}

impl PolicyChangeNotifier {
    /// Create a notifier buffering up to `capacity` pending notifications.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Notify all subscribers. Dropped silently when nobody listens.
    pub fn notify(&self, change: PolicyChange) {
        let _ = self.sender.send(change);
    }

    /// Subscribe to future notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PolicyChange> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PolicyChangeNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

// =============================================================================
// Policy Sources
// =============================================================================

/// A provider of declarative policy documents.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Load the full policy set.
    async fn load(&self) -> AclResult<Vec<PolicyDocument>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Encoding of a policy file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFormat {
    /// JSON, the default.
    Json,
    /// TOML, selected by a `.toml` extension.
    Toml,
}

impl PolicyFormat {
    /// Pick the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Decode a policy set in the given format.
///
/// # Errors
///
/// Returns [`AclError::Parse`] if the content is not a valid policy set.
pub fn parse_policy_set(content: &str, format: PolicyFormat) -> AclResult<Vec<PolicyDocument>> {
    let set: PolicySet = match format {
        PolicyFormat::Json => serde_json::from_str(content)?,
        PolicyFormat::Toml => toml::from_str(content)?,
    };
    Ok(set.into_documents())
}

/// Loads policies from a JSON or TOML file.
#[derive(Debug, Clone)]
pub struct FilePolicySource {
    path: PathBuf,
    format: PolicyFormat,
}

impl FilePolicySource {
    /// Create a source reading `path`, format chosen by extension.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = PolicyFormat::from_path(&path);
        Self { path, format }
    }

    /// The file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PolicySource for FilePolicySource {
    async fn load(&self) -> AclResult<Vec<PolicyDocument>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AclError::source_failed(format!("{}: {}", self.path.display(), e))
        })?;

        parse_policy_set(&content, self.format).map_err(|e| match e {
            AclError::Parse { message } => {
                AclError::parse(format!("{}: {}", self.path.display(), message))
            }
            other => other,
        })
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// In-memory policy documents.
#[derive(Debug, Default)]
pub struct StaticPolicySource {
    documents: std::sync::RwLock<Vec<PolicyDocument>>,
}

impl StaticPolicySource {
    /// Create a source serving `documents`.
    #[must_use]
    pub fn new(documents: Vec<PolicyDocument>) -> Self {
        Self {
            documents: std::sync::RwLock::new(documents),
        }
    }

    /// Replace the served documents.
    pub fn set(&self, documents: Vec<PolicyDocument>) {
        match self.documents.write() {
            Ok(mut guard) => *guard = documents,
            Err(poisoned) => *poisoned.into_inner() = documents,
        }
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn load(&self) -> AclResult<Vec<PolicyDocument>> {
        self.documents
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| AclError::internal("static policy source lock poisoned"))
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

// =============================================================================
// Reload Configuration
// =============================================================================

/// Configuration for the policy reload service.
#[derive(Debug, Clone)]
pub struct ReloadConfig {
    /// Quiet period after the last request before reloading.
    pub debounce: Duration,

    /// Periodic refresh interval. `None` disables periodic refresh.
    pub periodic_refresh: Option<Duration>,

    /// Maximum number of attempts per reload.
    pub max_retry_attempts: usize,

    /// Initial retry backoff. Doubles on each retry.
    pub retry_backoff: Duration,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            periodic_refresh: None,
            max_retry_attempts: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl ReloadConfig {
    /// Configuration for testing with fast timeouts.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            debounce: Duration::from_millis(10),
            periodic_refresh: None,
            max_retry_attempts: 3,
            retry_backoff: Duration::from_millis(10),
        }
    }
}

// =============================================================================
// Reload Statistics
// =============================================================================

/// Statistics about the reload service.
#[derive(Debug, Clone, Default)]
pub struct ReloadStats {
    /// Total number of load attempts.
    pub reload_attempts: u64,
    /// Number of successful reloads.
    pub successful_reloads: u64,
    /// Number of reloads that failed after all retries.
    pub failed_reloads: u64,
    /// Number of reload requests received.
    pub notifications_received: u64,
    /// Number of requests folded into an already pending reload.
    pub notifications_debounced: u64,
}

// =============================================================================
// Policy Reload Service
// =============================================================================

/// Reloads a [`PolicyStore`] from a [`PolicySource`].
///
/// A reload converts every document before touching the store: one invalid
/// document fails the whole reload and the previous snapshot stays live.
pub struct PolicyReloadService {
    store: Arc<PolicyStore>,
    source: Arc<dyn PolicySource>,
    notifier: Arc<PolicyChangeNotifier>,
    config: ReloadConfig,

    shutdown: AtomicBool,
    shutdown_signal: Notify,

    reload_attempts: AtomicU64,
    successful_reloads: AtomicU64,
    failed_reloads: AtomicU64,
    notifications_received: AtomicU64,
    notifications_debounced: AtomicU64,
}

impl PolicyReloadService {
    /// Create a new reload service.
    #[must_use]
    pub fn new(
        store: Arc<PolicyStore>,
        source: Arc<dyn PolicySource>,
        notifier: Arc<PolicyChangeNotifier>,
        config: ReloadConfig,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            config,
            shutdown: AtomicBool::new(false),
            shutdown_signal: Notify::new(),
            reload_attempts: AtomicU64::new(0),
            successful_reloads: AtomicU64::new(0),
            failed_reloads: AtomicU64::new(0),
            notifications_received: AtomicU64::new(0),
            notifications_debounced: AtomicU64::new(0),
        }
    }

    /// Run until [`shutdown`](Self::shutdown) is called or the channel closes.
    pub async fn run(&self) {
        let mut receiver = self.notifier.subscribe();
        let debounce = self.config.debounce;

        let mut pending_reload = false;
        let mut last_request = Instant::now();
        let mut last_refresh = Instant::now();

        tracing::info!(source = %self.source.describe(), "Policy reload service started");

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!("Policy reload service shutting down");
                break;
            }

            let periodic_remaining = self
                .config
                .periodic_refresh
                .map_or(Duration::MAX, |d| d.saturating_sub(last_refresh.elapsed()));

            let timeout = if pending_reload {
                debounce
                    .saturating_sub(last_request.elapsed())
                    .min(periodic_remaining)
            } else {
                periodic_remaining
            };

            tokio::select! {
                () = self.shutdown_signal.notified() => {}

                result = receiver.recv() => {
                    match result {
                        Ok(change) if change.is_bulk_reload() => {
                            tracing::debug!("Policy reload requested");
                            self.notifications_received.fetch_add(1, Ordering::Relaxed);
                            if pending_reload {
                                self.notifications_debounced.fetch_add(1, Ordering::Relaxed);
                            }
                            pending_reload = true;
                            last_request = Instant::now();
                        }
                        Ok(change) => {
                            tracing::trace!(change = ?change, "Ignoring store change");
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "Missed policy change notifications");
                            self.notifications_debounced.fetch_add(n, Ordering::Relaxed);
                            pending_reload = true;
                            last_request = Instant::now();
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("Policy change channel closed");
                            break;
                        }
                    }
                }

                () = tokio::time::sleep(timeout) => {
                    if pending_reload && last_request.elapsed() >= debounce {
                        pending_reload = false;
                        self.perform_reload().await;
                        last_refresh = Instant::now();
                    } else if let Some(period) = self.config.periodic_refresh
                        && last_refresh.elapsed() >= period
                    {
                        tracing::debug!("Periodic policy refresh");
                        self.perform_reload().await;
                        last_refresh = Instant::now();
                    }
                }
            }
        }
    }

    async fn perform_reload(&self) {
        if let Err(e) = self.reload_with_retry().await {
            tracing::error!(error = %e, "Policy reload failed after all retries");
        }
    }

    /// Load, convert and install the policy set once.
    ///
    /// Returns the number of installed entries.
    ///
    /// # Errors
    ///
    /// Returns the source or conversion error; the store is left untouched.
    pub async fn reload_once(&self) -> AclResult<usize> {
        self.reload_attempts.fetch_add(1, Ordering::Relaxed);

        let documents = self.source.load().await?;
        let entries = to_policy_entries(&documents)?;
        let count = entries.len();
        self.store.replace_all(entries);
        Ok(count)
    }

    /// Reload with retry and exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns the last error once `max_retry_attempts` is exhausted.
    pub async fn reload_with_retry(&self) -> AclResult<usize> {
        let mut attempts = 0;
        let mut backoff = self.config.retry_backoff;

        loop {
            match self.reload_once().await {
                Ok(count) => {
                    self.successful_reloads.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        entries = count,
                        version = self.store.version(),
                        source = %self.source.describe(),
                        "Policies reloaded"
                    );
                    return Ok(count);
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.config.max_retry_attempts {
                        self.failed_reloads.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }

                    tracing::warn!(
                        attempt = attempts,
                        max_attempts = self.config.max_retry_attempts,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Policy reload failed, retrying"
                    );

                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    /// Request a reload through the notification channel.
    pub fn trigger_reload(&self) {
        self.notifier.notify(PolicyChange::BulkReload);
    }

    /// Signal the service to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.shutdown_signal.notify_one();
    }

    /// Check if the service is shutting down.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Get reload statistics.
    #[must_use]
    pub fn stats(&self) -> ReloadStats {
        ReloadStats {
            reload_attempts: self.reload_attempts.load(Ordering::Relaxed),
            successful_reloads: self.successful_reloads.load(Ordering::Relaxed),
            failed_reloads: self.failed_reloads.load(Ordering::Relaxed),
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            notifications_debounced: self.notifications_debounced.load(Ordering::Relaxed),
        }
    }

    /// The store being reloaded.
    #[must_use]
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// The notification channel.
    #[must_use]
    pub fn notifier(&self) -> &Arc<PolicyChangeNotifier> {
        &self.notifier
    }
}

// =============================================================================
// Tests
// =============================================================================
