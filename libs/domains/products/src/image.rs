//! Image compression processor for the image worker
//!
//! Compression is simulated: the derived artifact is the original reference
//! with `-compressed` inserted before the extension of its final path
//! segment. Payloads containing the failure marker always fail, which keeps
//! the retry path exercisable end to end.

use async_trait::async_trait;
use image_pipeline::{ProcessingError, ProcessingResult, Processor, WorkItem};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheInvalidator, ProductCache};
use crate::repository::ProductRepository;

pub const DEFAULT_FAILURE_MARKER: &str = "fail";
const COMPRESSED_SUFFIX: &str = "-compressed";

/// Persistence failure while recording a derived artifact
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Backing store for derived artifacts.
///
/// `append_artifact` must be idempotent: appending a reference that is
/// already recorded leaves the collection unchanged.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    async fn append_artifact(&self, resource_id: i64, artifact: &str) -> Result<(), StoreError>;
}

/// Derived reference for a compressed image.
///
/// `a.jpg` becomes `a-compressed.jpg`; `cdn.example.com/p/a.jpg` becomes
/// `cdn.example.com/p/a-compressed.jpg`. References without an extension get
/// the suffix appended.
pub fn compressed_reference(reference: &str) -> String {
    let segment_start = reference.rfind('/').map_or(0, |i| i + 1);

    match reference[segment_start..].find('.') {
        Some(dot) => {
            let split = segment_start + dot;
            format!(
                "{}{}{}",
                &reference[..split],
                COMPRESSED_SUFFIX,
                &reference[split..]
            )
        }
        None => format!("{}{}", reference, COMPRESSED_SUFFIX),
    }
}

/// [`Processor`] that compresses one product image and records the result
pub struct ImageProcessor<S: ArtifactStore> {
    store: Arc<S>,
    failure_marker: String,
}

impl<S: ArtifactStore> ImageProcessor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
        }
    }

    pub fn with_failure_marker(mut self, marker: impl Into<String>) -> Self {
        self.failure_marker = marker.into();
        self
    }
}

#[async_trait]
impl<S: ArtifactStore> Processor for ImageProcessor<S> {
    async fn process(&self, item: &WorkItem) -> ProcessingResult {
        if !self.failure_marker.is_empty() && item.payload.contains(&self.failure_marker) {
            return Err(ProcessingError::transient("simulated processing failure"));
        }

        let artifact = compressed_reference(&item.payload);

        self.store
            .append_artifact(item.resource_id, &artifact)
            .await
            .map_err(|e| ProcessingError::store(e.to_string()))?;

        Ok(artifact)
    }

    fn name(&self) -> &'static str {
        "image_compressor"
    }
}

/// Artifact store over the product repository.
///
/// After every append it drops the product's cached read so the new
/// compressed image becomes visible.
pub struct ProductArtifactStore<R: ProductRepository, C: ProductCache> {
    repository: Arc<R>,
    invalidator: CacheInvalidator<C>,
}

impl<R: ProductRepository, C: ProductCache> ProductArtifactStore<R, C> {
    pub fn new(repository: Arc<R>, invalidator: CacheInvalidator<C>) -> Self {
        Self {
            repository,
            invalidator,
        }
    }
}

#[async_trait]
impl<R, C> ArtifactStore for ProductArtifactStore<R, C>
where
    R: ProductRepository + 'static,
    C: ProductCache + 'static,
{
    async fn append_artifact(&self, resource_id: i64, artifact: &str) -> Result<(), StoreError> {
        let appended = self
            .repository
            .append_compressed_image(resource_id, artifact)
            .await
            .map_err(|e| StoreError(e.to_string()))?;

        if !appended {
            debug!(
                product_id = resource_id,
                artifact, "Artifact already recorded or product missing"
            );
        }

        // Also on redelivery: the first attempt may have died before this point
        self.invalidator.invalidate(resource_id).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockProductCache;
    use crate::error::ProductError;
    use crate::repository::MockProductRepository;
    use image_pipeline::ErrorCategory;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Duplicate-tolerant store keyed by resource id
    #[derive(Default)]
    struct MemoryStore {
        artifacts: Mutex<HashMap<i64, Vec<String>>>,
        appends: Mutex<u32>,
    }

    impl MemoryStore {
        fn artifacts(&self, id: i64) -> Vec<String> {
            self.artifacts
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ArtifactStore for MemoryStore {
        async fn append_artifact(&self, id: i64, artifact: &str) -> Result<(), StoreError> {
            *self.appends.lock().unwrap() += 1;
            let mut artifacts = self.artifacts.lock().unwrap();
            let entry = artifacts.entry(id).or_default();
            if !entry.iter().any(|a| a == artifact) {
                entry.push(artifact.to_string());
            }
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ArtifactStore for BrokenStore {
        async fn append_artifact(&self, _id: i64, _artifact: &str) -> Result<(), StoreError> {
            Err(StoreError("connection reset by peer".into()))
        }
    }

    #[test]
    fn test_compressed_reference() {
        assert_eq!(compressed_reference("a.jpg"), "a-compressed.jpg");
        assert_eq!(
            compressed_reference("https://cdn.example.com/img/a.jpg"),
            "https://cdn.example.com/img/a-compressed.jpg"
        );
        assert_eq!(compressed_reference("archive.tar.gz"), "archive-compressed.tar.gz");
        assert_eq!(compressed_reference("uploads/raw"), "uploads/raw-compressed");
    }

    #[tokio::test]
    async fn test_success_appends_once() {
        let store = Arc::new(MemoryStore::default());
        let processor = ImageProcessor::new(store.clone());

        let artifact = processor.process(&WorkItem::new(1, "a.jpg")).await.unwrap();

        assert_eq!(artifact, "a-compressed.jpg");
        assert_eq!(store.artifacts(1), vec!["a-compressed.jpg".to_string()]);
        assert_eq!(*store.appends.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failure_marker_always_fails() {
        let store = Arc::new(MemoryStore::default());
        let processor = ImageProcessor::new(store.clone());

        for attempt in 0..3 {
            let item = WorkItem::new(1, "fail.jpg").with_attempt(attempt);
            let err = processor.process(&item).await.unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Transient);
        }
        assert_eq!(*store.appends.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_custom_failure_marker() {
        let processor =
            ImageProcessor::new(Arc::new(MemoryStore::default())).with_failure_marker("broken");

        assert!(processor.process(&WorkItem::new(1, "fail.jpg")).await.is_ok());
        assert!(processor.process(&WorkItem::new(1, "broken.jpg")).await.is_err());
    }

    #[tokio::test]
    async fn test_store_failure_is_transient() {
        let processor = ImageProcessor::new(Arc::new(BrokenStore));

        let err = processor.process(&WorkItem::new(1, "a.jpg")).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Store(_)));
        assert_eq!(err.category(), ErrorCategory::Transient);
    }

    #[tokio::test]
    async fn test_redelivery_does_not_duplicate() {
        let store = Arc::new(MemoryStore::default());
        let processor = ImageProcessor::new(store.clone());
        let item = WorkItem::new(2, "a.jpg");

        processor.process(&item).await.unwrap();
        processor.process(&item).await.unwrap();

        assert_eq!(store.artifacts(2), vec!["a-compressed.jpg".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_for_same_resource() {
        let store = Arc::new(MemoryStore::default());
        let processor = Arc::new(ImageProcessor::new(store.clone()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let processor = processor.clone();
                tokio::spawn(async move {
                    processor
                        .process(&WorkItem::new(7, format!("img{}.jpg", i)))
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut artifacts = store.artifacts(7);
        artifacts.sort();
        assert_eq!(artifacts.len(), 16);
        assert!(artifacts.contains(&"img0-compressed.jpg".to_string()));
        assert!(artifacts.contains(&"img15-compressed.jpg".to_string()));
    }

    #[tokio::test]
    async fn test_product_store_invalidates_after_append() {
        let mut repo = MockProductRepository::new();
        repo.expect_append_compressed_image()
            .withf(|id, image| *id == 5 && image == "a-compressed.jpg")
            .times(1)
            .returning(|_, _| Ok(true));

        let mut cache = MockProductCache::new();
        cache
            .expect_delete()
            .withf(|key| key == "product:5")
            .times(1)
            .returning(|_| Ok(()));

        let store =
            ProductArtifactStore::new(Arc::new(repo), CacheInvalidator::new(Arc::new(cache)));
        store.append_artifact(5, "a-compressed.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_product_store_invalidates_on_duplicate_append() {
        let mut repo = MockProductRepository::new();
        repo.expect_append_compressed_image()
            .returning(|_, _| Ok(false));
        let mut cache = MockProductCache::new();
        cache.expect_delete().times(1).returning(|_| Ok(()));

        let store =
            ProductArtifactStore::new(Arc::new(repo), CacheInvalidator::new(Arc::new(cache)));
        store.append_artifact(5, "a-compressed.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn test_product_store_maps_database_errors() {
        let mut repo = MockProductRepository::new();
        repo.expect_append_compressed_image()
            .returning(|_, _| Err(ProductError::Database("pool timed out".into())));
        let mut cache = MockProductCache::new();
        cache.expect_delete().never();

        let store =
            ProductArtifactStore::new(Arc::new(repo), CacheInvalidator::new(Arc::new(cache)));
        let err = store.append_artifact(5, "a-compressed.jpg").await.unwrap_err();
        assert!(err.0.contains("pool timed out"));
    }
}
