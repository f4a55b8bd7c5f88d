//! # Schema Cache
//!
//! Keeps one [`DependentSchemaBundle`] per producing component, bounded by entry count and
//! time-to-live.
//!
//! ## How it works
//!
//! * **Hit**: the entry exists and is younger than the TTL. Served under a shared read lock,
//!   with no I/O and no exclusive locking.
//! * **Miss**: sources are fetched from the [`SchemaSourceProvider`], compiled on the blocking
//!   pool, assembled into one [`DescriptorGraph`] per file and indexed into a bundle. Concurrent
//!   misses for the same component wait on a per-component build lock and pick up the bundle the
//!   first one built. Misses for different components build in parallel.
//! * **Failure**: nothing is inserted, so the next call starts a fresh build.
//! * **Eviction**: expired entries are dropped whenever a bundle is inserted, then the least
//!   recently used ones go until the cache is back under capacity.
//!
//! Entries are never mutated after insertion, a rebuild swaps in a new bundle.
use super::compiler::{CompileError, SchemaCompiler};
use super::graph::{AssembleError, DescriptorGraph};
use super::json_schema::JsonSchemaDoc;
use super::registry::{DependentSchemaBundle, RegistryError};
use super::types::{ProtoService, ServiceKey};
use crate::error::ErrorKind;
use crate::provider::{ProviderError, SchemaSourceProvider};
use crate::settings::CacheSettings;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Schema compilation task failed: '{0}'")]
    Task(#[from] tokio::task::JoinError),
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BuildError::Provider(err) => err.kind(),
            BuildError::Registry(_) => ErrorKind::NotFound,
            BuildError::Compile(_) | BuildError::Assemble(_) | BuildError::Task(_) => {
                ErrorKind::Compilation
            }
        }
    }
}

struct Entry {
    bundle: Arc<DependentSchemaBundle>,
    inserted: Instant,
    last_access: AtomicU64,
}

/// A TTL and capacity bounded cache of schema bundles, keyed by producing component.
pub struct SchemaCache {
    provider: Arc<dyn SchemaSourceProvider>,
    compiler: Arc<dyn SchemaCompiler>,
    settings: CacheSettings,
    search_paths: Vec<PathBuf>,
    entries: RwLock<HashMap<String, Entry>>,
    builds: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    clock: AtomicU64,
}

impl SchemaCache {
    pub fn new(
        provider: Arc<dyn SchemaSourceProvider>,
        compiler: Arc<dyn SchemaCompiler>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            provider,
            compiler,
            settings,
            search_paths: Vec::new(),
            entries: RwLock::new(HashMap::new()),
            builds: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    /// Extra include directories handed to the compiler on every build.
    pub fn with_search_paths(mut self, search_paths: Vec<PathBuf>) -> Self {
        self.search_paths = search_paths;
        self
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the bundle of `component`, building it on a miss.
    pub async fn get_bundle(
        &self,
        component: &str,
    ) -> Result<Arc<DependentSchemaBundle>, BuildError> {
        if let Some(bundle) = self.lookup(component) {
            debug!(component, "schema cache hit");
            return Ok(bundle);
        }

        let build_lock = self.build_lock(component);
        let _guard = build_lock.lock().await;

        if let Some(bundle) = self.lookup(component) {
            debug!(component, "schema bundle built by a concurrent request");
            return Ok(bundle);
        }

        debug!(component, "schema cache miss");
        let result = self.build(component).await.map(Arc::new);
        match &result {
            Ok(bundle) => self.insert(component, bundle.clone()),
            Err(err) => warn!(component, error = %err, "failed to build schema bundle"),
        }
        // The bundle is visible before the lock goes, so late arrivals hit the cache.
        self.builds.lock().remove(component);

        result
    }

    pub async fn list_services(&self, component: &str) -> Result<Vec<ServiceKey>, BuildError> {
        Ok(self.get_bundle(component).await?.list_services())
    }

    pub async fn describe_service(&self, key: &ServiceKey) -> Result<ProtoService, BuildError> {
        let bundle = self.get_bundle(&key.component).await?;
        Ok(bundle.service(key)?.clone())
    }

    /// JSON-Schema documents of a service, or of one of its methods when `method` is given.
    pub async fn json_schema(
        &self,
        key: &ServiceKey,
        method: Option<&str>,
    ) -> Result<BTreeMap<String, JsonSchemaDoc>, BuildError> {
        let bundle = self.get_bundle(&key.component).await?;
        let docs = match method {
            Some(method) => bundle.method_json_schemas(key, method)?,
            None => bundle.json_schemas_for(key)?,
        };
        Ok(docs)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn lookup(&self, component: &str) -> Option<Arc<DependentSchemaBundle>> {
        let entries = self.entries.read();
        let entry = entries.get(component)?;
        if entry.inserted.elapsed() >= self.settings.ttl() {
            return None;
        }
        entry.last_access.store(self.tick(), Ordering::Relaxed);
        Some(entry.bundle.clone())
    }

    fn build_lock(&self, component: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.builds
            .lock()
            .entry(component.to_string())
            .or_default()
            .clone()
    }

    async fn build(&self, component: &str) -> Result<DependentSchemaBundle, BuildError> {
        let sources = self.provider.fetch(component).await?;
        info!(component, files = sources.len(), "compiling schema bundle");

        let started = Instant::now();
        let compiler = self.compiler.clone();
        let search_paths = self.search_paths.clone();
        let owner = component.to_string();

        let bundle = tokio::task::spawn_blocking(move || -> Result<_, BuildError> {
            let compiled = compiler.compile(&sources, &search_paths)?;
            let graphs = compiled
                .iter()
                .map(|schema| DescriptorGraph::assemble(&owner, &schema.main_file, &schema.files))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DependentSchemaBundle::new(owner, graphs))
        })
        .await??;

        info!(
            component,
            services = bundle.list_services().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "schema bundle ready"
        );
        Ok(bundle)
    }

    fn insert(&self, component: &str, bundle: Arc<DependentSchemaBundle>) {
        let ttl = self.settings.ttl();
        let capacity = self.settings.capacity.max(1);
        let mut entries = self.entries.write();

        entries.retain(|_, entry| entry.inserted.elapsed() < ttl);
        entries.insert(
            component.to_string(),
            Entry {
                bundle,
                inserted: Instant::now(),
                last_access: AtomicU64::new(self.tick()),
            },
        );

        while entries.len() > capacity {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            debug!(component = %oldest, "evicting least recently used schema bundle");
            entries.remove(&oldest);
        }
    }
}
