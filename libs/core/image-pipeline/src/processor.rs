//! Processor trait for work item execution.

use crate::envelope::WorkItem;
use crate::error::ProcessingError;
use async_trait::async_trait;
use std::sync::Arc;

/// Outcome of one processing attempt: the derived artifact reference, or a
/// typed failure.
pub type ProcessingResult = Result<String, ProcessingError>;

/// Work item processor.
///
/// The consumer calls [`Processor::process`] at most once per delivery and
/// routes on the returned error's category:
/// - `Transient` / `Store`: retried through the retry queue until the
///   attempt limit, then dead-lettered
/// - `Permanent`: dead-lettered without retry
///
/// Implementations must tolerate the same item being processed more than
/// once (broker redelivery after a crash); persisting the artifact has to be
/// idempotent.
///
/// # Example
///
/// ```rust,ignore
/// struct Thumbnailer {
///     store: Arc<dyn ArtifactStore>,
/// }
///
/// #[async_trait]
/// impl Processor for Thumbnailer {
///     async fn process(&self, item: &WorkItem) -> ProcessingResult {
///         let artifact = thumbnail(&item.payload)
///             .map_err(|e| ProcessingError::transient(e.to_string()))?;
///         self.store
///             .append_artifact(item.resource_id, &artifact)
///             .await
///             .map_err(|e| ProcessingError::store(e.to_string()))?;
///         Ok(artifact)
///     }
///
///     fn name(&self) -> &'static str {
///         "thumbnailer"
///     }
/// }
/// ```
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Process one work item
    async fn process(&self, item: &WorkItem) -> ProcessingResult;

    /// Processor name for logging and metric labels
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<P: Processor> Processor for Arc<P> {
    async fn process(&self, item: &WorkItem) -> ProcessingResult {
        (**self).process(item).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
