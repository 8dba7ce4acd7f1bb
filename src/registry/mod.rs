//! Dataset registry: lookup key -> query descriptors, refreshed from catalog metadata.
//!
//! Readers take an `Arc` of the current [`RegistrySnapshot`] and never wait for a
//! refresh. A refresh builds a whole new snapshot and swaps it in; at most one runs
//! at a time and callers that queue behind it reuse its result.

pub mod catalog;
pub mod schema;
pub mod static_datasets;

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};

pub use catalog::{descriptor_from_row, CatalogKind, CatalogRow, CatalogSource, PgCatalog};
pub use static_datasets::builtin_descriptors;

use crate::query::descriptor::DEFAULT_RADIUS;
use crate::query::QueryDescriptor;

pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Catalog unavailable: {0}")]
    Catalog(String),
}

/// Immutable view of every registered descriptor.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// When catalog data was last loaded; `None` until the first successful refresh.
    pub created_at: Option<Instant>,
    descriptors: BTreeMap<String, Arc<QueryDescriptor>>,
    dataset_keys: BTreeMap<String, BTreeSet<String>>,
    table_keys: BTreeMap<String, String>,
}

impl RegistrySnapshot {
    /// Add or replace a descriptor under its dataset, bare table and `dataset/table` keys.
    pub fn register(&mut self, descriptor: QueryDescriptor) {
        let ident = descriptor.table_ident();
        if self.descriptors.contains_key(&ident) {
            debug!("Replacing descriptor {}", ident);
        }

        self.dataset_keys
            .entry(descriptor.dataset_name.clone())
            .or_default()
            .insert(ident.clone());

        if let Some(previous) = self.table_keys.get(&descriptor.table_name) {
            if *previous != ident {
                info!(
                    "Provider for {} already defined by {} and will be overwritten by {}",
                    descriptor.table_name, previous, ident
                );
            }
        }
        self.table_keys.insert(descriptor.table_name.clone(), ident.clone());
        self.descriptors.insert(ident, Arc::new(descriptor));
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn is_stale(&self, delay: Duration) -> bool {
        self.created_at.map_or(true, |t| t.elapsed() > delay)
    }

    pub fn get(&self, ident: &str) -> Option<&Arc<QueryDescriptor>> {
        self.descriptors.get(ident)
    }

    fn idents_for<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a String> + 'a {
        let composite = self.descriptors.get_key_value(key).map(|(k, _)| k);
        let table = self.table_keys.get(key);
        let dataset = self.dataset_keys.get(key).into_iter().flatten();
        composite.into_iter().chain(table).chain(dataset)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.idents_for(key).next().is_some()
    }

    /// Descriptors matching any of `names` that `granted` may see, ordered by ident.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S], granted: Option<&BTreeSet<String>>) -> Vec<Arc<QueryDescriptor>> {
        let idents: BTreeSet<&String> = names.iter().flat_map(|n| self.idents_for(n.as_ref())).collect();
        idents
            .into_iter()
            .filter_map(|ident| self.descriptors.get(ident))
            .filter(|d| d.is_visible_to(granted))
            .cloned()
            .collect()
    }

    /// Names among `names` that match no key at all.
    pub fn unknown<'a, S: AsRef<str>>(&self, names: &'a [S]) -> Vec<&'a str> {
        names.iter().map(|n| n.as_ref()).filter(|n| !self.contains_key(n)).collect()
    }

    /// Every lookup key with at least one descriptor visible to `granted`.
    pub fn visible_keys(&self, granted: Option<&BTreeSet<String>>) -> Vec<String> {
        let mut keys: BTreeSet<&String> = BTreeSet::new();
        keys.extend(self.descriptors.keys());
        keys.extend(self.dataset_keys.keys());
        keys.extend(self.table_keys.keys());
        keys.into_iter()
            .filter(|key| {
                self.idents_for(key)
                    .filter_map(|ident| self.descriptors.get(ident))
                    .any(|d| d.is_visible_to(granted))
            })
            .cloned()
            .collect()
    }
}

pub struct DatasetRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    statics: Mutex<Vec<QueryDescriptor>>,
    catalogs: Vec<Arc<dyn CatalogSource>>,
    api_base_url: String,
    refresh_delay: Duration,
    default_radius: f64,
    refresh_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

impl DatasetRegistry {
    pub fn new(catalogs: Vec<Arc<dyn CatalogSource>>, api_base_url: impl Into<String>, refresh_delay: Duration) -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
            statics: Mutex::new(Vec::new()),
            catalogs,
            api_base_url: api_base_url.into(),
            refresh_delay,
            default_radius: DEFAULT_RADIUS,
            refresh_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Radius given to catalog datasets when a request names none.
    pub fn with_default_radius(mut self, radius: f64) -> Self {
        self.default_radius = radius;
        self
    }

    /// Register a descriptor that survives every refresh.
    pub fn register_static(&self, descriptor: QueryDescriptor) {
        // Held until the swap so a concurrent refresh either sees this descriptor or runs after it.
        let mut statics = self.statics.lock();
        statics.push(descriptor.clone());
        let mut current = self.current.write();
        let mut next = (**current).clone();
        next.register(descriptor);
        *current = Arc::new(next);
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().clone()
    }

    pub fn is_stale(&self) -> bool {
        self.snapshot().is_stale(self.refresh_delay)
    }

    /// Completed refreshes since start.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn resolve<S: AsRef<str>>(&self, names: &[S], granted: Option<&BTreeSet<String>>) -> Vec<Arc<QueryDescriptor>> {
        self.snapshot().resolve(names, granted)
    }

    pub fn dataset_names(&self, granted: Option<&BTreeSet<String>>) -> Vec<String> {
        self.snapshot().visible_keys(granted)
    }

    /// Refresh from the catalogs if the snapshot is older than the refresh delay.
    pub async fn ensure_fresh(&self) -> Result<(), RegistryError> {
        if !self.is_stale() {
            return Ok(());
        }
        self.refresh(false).await
    }

    /// Re-read the catalogs now, regardless of age.
    pub async fn force_refresh(&self) -> Result<(), RegistryError> {
        self.refresh(true).await
    }

    /// Start a background refresh when stale and none is running.
    pub fn spawn_refresh_if_stale(self: &Arc<Self>) {
        if !self.is_stale() || self.refresh_lock.try_lock().is_err() {
            return;
        }
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = registry.ensure_fresh().await {
                error!("Dataset registry refresh failed: {}", e);
            }
        });
    }

    /// Request-path refresh: load synchronously on first use, afterwards refresh in the background.
    pub async fn ensure_loaded(self: &Arc<Self>) {
        if self.snapshot().created_at.is_some() {
            self.spawn_refresh_if_stale();
            return;
        }
        if let Err(e) = self.ensure_fresh().await {
            error!("Dataset registry refresh failed: {}", e);
        }
    }

    async fn refresh(&self, force: bool) -> Result<(), RegistryError> {
        let seen = self.generation();
        let _guard = self.refresh_lock.lock().await;
        if self.generation() != seen {
            debug!("Refresh already completed by a concurrent caller");
            return Ok(());
        }
        if !force && !self.is_stale() {
            return Ok(());
        }

        let mut rows = Vec::new();
        for catalog in &self.catalogs {
            rows.extend(catalog.fetch_rows().await?);
        }

        let discovered: Vec<QueryDescriptor> = rows
            .iter()
            .filter_map(|row| descriptor_from_row(row, &self.api_base_url))
            .map(|descriptor| descriptor.with_default_radius(self.default_radius))
            .collect();

        let statics = self.statics.lock();
        let mut next = RegistrySnapshot::default();
        for descriptor in statics.iter() {
            next.register(descriptor.clone());
        }
        let added = discovered.len();
        for descriptor in discovered {
            next.register(descriptor);
        }
        next.created_at = Some(Instant::now());

        info!("Dataset registry refreshed: {} catalog datasets, {} total", added, next.len());
        *self.current.write() = Arc::new(next);
        drop(statics);
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
