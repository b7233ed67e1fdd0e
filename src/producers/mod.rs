//! File producer pipeline: an ordered chain of [`Producer`]s that resolve a
//! URL path to a cached byte blob with content-type. First non-null answer
//! wins; the blob cache is single-flight per path.

mod alias;
mod content_type;
mod filesystem;
mod resource;
mod synthetic;

pub use alias::{default_aliases, AliasProducer};
pub use content_type::ContentTypeMap;
pub use filesystem::FilesystemProducer;
pub use resource::ResourceProducer;
pub use synthetic::{version_js, SyntheticProducer};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Arc<Vec<u8>>,
    pub content_type: String,
    pub generated_at: Instant,
}

impl Blob {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::new(bytes),
            content_type: content_type.into(),
            generated_at: Instant::now(),
        }
    }
}

#[async_trait]
pub trait Producer: Send + Sync {
    /// Attempt to resolve `path`. `Ok(None)` means "not mine, ask the next
    /// producer"; `Err` is a server-side fault on this one path (spec §7) and
    /// short-circuits the chain rather than falling through to a 404.
    async fn get(&self, path: &str) -> Result<Option<Blob>, AppError>;
}

struct CacheEntry {
    blob: Blob,
    cached_at: Instant,
}

/// Ordered producer chain with a single-flight, TTL'd cache keyed by path.
pub struct ProducerChain {
    producers: Vec<Arc<dyn Producer>>,
    cache: DashMap<String, CacheEntry>,
    inflight: DashMap<String, Arc<OnceCell<Result<Option<Blob>, String>>>>,
    max_age: Duration,
}

impl ProducerChain {
    pub fn new(max_age: Duration) -> Self {
        Self {
            producers: Vec::new(),
            cache: DashMap::new(),
            inflight: DashMap::new(),
            max_age,
        }
    }

    pub fn push(&mut self, producer: Arc<dyn Producer>) {
        self.producers.push(producer);
    }

    /// Ask each producer in registration order; first non-null wins. At most
    /// one concurrent producer invocation runs per path; other waiters for the
    /// same path share the result. A producer's I/O fault short-circuits the
    /// chain as a transient error rather than being treated as "not found" —
    /// it is never cached, so the next call retries the chain from scratch.
    pub async fn get(&self, path: &str) -> Result<Option<Blob>, AppError> {
        if let Some(entry) = self.cache.get(path) {
            if entry.cached_at.elapsed() < self.max_age {
                return Ok(Some(entry.blob.clone()));
            }
        }

        let cell = self
            .inflight
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_init(|| async {
                for producer in &self.producers {
                    match producer.get(path).await {
                        Ok(Some(blob)) => return Ok(Some(blob)),
                        Ok(None) => continue,
                        Err(err) => return Err(err.to_string()),
                    }
                }
                Ok(None)
            })
            .await
            .clone();

        // Populate the shared cache before dropping the inflight cell, so a
        // concurrent caller for the same path never observes neither: it
        // either joins the still-live inflight cell or finds the fresh cache
        // entry, never a gap that would re-trigger the producer chain.
        if let Ok(Some(blob)) = &result {
            self.cache.insert(
                path.to_string(),
                CacheEntry {
                    blob: blob.clone(),
                    cached_at: Instant::now(),
                },
            );
        }
        self.inflight.remove(path);

        result.map_err(AppError::ServerTransient)
    }
}
