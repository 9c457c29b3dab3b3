//! Run a unit of work against a deferred scope
//!
//! The unit of work receives the producer it should use as an argument
//! (`&dyn MessageProducer`) instead of finding it on a shared component,
//! so concurrent units of work never observe each other's scopes.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use microcosm_producer::{deferred, MessageProducer, PubSubError, Producer};
//! # async fn example(producer: Arc<Producer>) -> Result<(), PubSubError> {
//! let id = deferred(&producer, |p| Box::pin(async move {
//!     p.produce("application/vnd.microcosm.pubsub.foo", serde_json::json!({"bar": 1})).await?;
//!     Ok::<_, PubSubError>(42)
//! }))
//! .await?;
//! # Ok(())
//! # }
//! ```
//!
//! Steps of a unit of work take the `&dyn MessageProducer` they are given,
//! so their messages land in the enclosing scope.
//!
//! For components that hold one long-lived handle, [`ScopedProducer`]
//! routes to the scope active on the current task instead. Nested
//! `ScopedProducer::deferred` calls join the outermost scope.

use crate::deferred::{DeferMode, DeferredScope};
use crate::error::{PubSubError, Result};
use crate::producer::{MessageProducer, Producer};
use crate::types::{MessageId, ProduceOptions};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Run `work` against `scope`, committing on `Ok` and discarding on `Err`
///
/// The error of `work` is returned unchanged; a commit failure is converted
/// into `E`. If the returned future is dropped before completion, the scope
/// is dropped with it and nothing is published.
pub async fn with_scope<T, E, F>(scope: DeferredScope, work: F) -> std::result::Result<T, E>
where
    F: for<'a> FnOnce(&'a dyn MessageProducer) -> BoxFuture<'a, std::result::Result<T, E>>,
    E: From<PubSubError>,
{
    let producer: &dyn MessageProducer = &scope;
    let result = work(producer).await;

    match result {
        Ok(value) => {
            scope.commit().await?;
            Ok(value)
        }
        Err(err) => {
            scope.discard();
            Err(err)
        }
    }
}

/// Defer every message produced by `work` until it succeeds
pub async fn deferred<T, E, F>(producer: &Arc<Producer>, work: F) -> std::result::Result<T, E>
where
    F: for<'a> FnOnce(&'a dyn MessageProducer) -> BoxFuture<'a, std::result::Result<T, E>>,
    E: From<PubSubError>,
{
    with_scope(producer.defer(), work).await
}

/// Like [`deferred`], but publish everything as one batch message
pub async fn deferred_batch<T, E, F>(producer: &Arc<Producer>, work: F) -> std::result::Result<T, E>
where
    F: for<'a> FnOnce(&'a dyn MessageProducer) -> BoxFuture<'a, std::result::Result<T, E>>,
    E: From<PubSubError>,
{
    with_scope(producer.defer_batch(), work).await
}

tokio::task_local! {
    static ACTIVE_SCOPE: Arc<DeferredScope>;
}

/// Producer handle that defers while a scope is active on the current task
///
/// Cloning is cheap. Outside [`ScopedProducer::deferred`] (or on other
/// tasks) messages go straight to the underlying producer.
#[derive(Clone)]
pub struct ScopedProducer {
    producer: Arc<Producer>,
}

impl ScopedProducer {
    pub fn new(producer: Arc<Producer>) -> Self {
        Self { producer }
    }

    /// The underlying producer
    pub fn producer(&self) -> &Arc<Producer> {
        &self.producer
    }

    fn active_scope(&self) -> Option<Arc<DeferredScope>> {
        ACTIVE_SCOPE
            .try_with(Arc::clone)
            .ok()
            .filter(|scope| Arc::ptr_eq(scope.producer(), &self.producer))
    }

    /// Whether messages produced here are currently deferred
    pub fn is_deferring(&self) -> bool {
        self.active_scope().is_some()
    }

    /// Defer messages produced through this handle while `work` runs
    ///
    /// Inside an active scope for the same producer, `work` runs in that
    /// scope: its messages are published only if the outermost unit of
    /// work succeeds, using the outermost scope's mode.
    pub async fn deferred<T, E, F, Fut>(&self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<PubSubError>,
    {
        self.run(DeferMode::Individual, work).await
    }

    /// Like [`ScopedProducer::deferred`], but publish one batch message
    pub async fn deferred_batch<T, E, F, Fut>(&self, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<PubSubError>,
    {
        self.run(DeferMode::Batch, work).await
    }

    async fn run<T, E, F, Fut>(&self, mode: DeferMode, work: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<PubSubError>,
    {
        // Nested units of work join the enclosing scope and commit or
        // discard with it
        if self.is_deferring() {
            tracing::debug!(?mode, "Joining active deferred scope");
            return work().await;
        }

        let scope = Arc::new(DeferredScope::with_mode(Arc::clone(&self.producer), mode));
        let result = ACTIVE_SCOPE.scope(Arc::clone(&scope), work()).await;

        // Handles only borrow the scope for the duration of one produce call
        let scope = Arc::try_unwrap(scope).map_err(|_| {
            PubSubError::Config("Deferred scope is still referenced after its unit of work".to_string())
        })?;

        match result {
            Ok(value) => {
                scope.commit().await?;
                Ok(value)
            }
            Err(err) => {
                scope.discard();
                Err(err)
            }
        }
    }
}

#[async_trait]
impl MessageProducer for ScopedProducer {
    async fn produce_with_options(
        &self,
        media_type: &str,
        payload: Value,
        opts: &ProduceOptions,
    ) -> Result<Option<MessageId>> {
        match self.active_scope() {
            Some(scope) => scope.produce_with_options(media_type, payload, opts).await,
            None => self.producer.produce_with_options(media_type, payload, opts).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MemoryCodecRegistry;
    use crate::naming::BATCH_MEDIA_TYPE;
    use crate::topics::TopicTable;
    use crate::transport::memory::MemoryTransport;

    const FOO_MEDIA_TYPE: &str = "application/vnd.microcosm.pubsub.foo";

    #[derive(Debug)]
    enum WorkError {
        Rejected,
        PubSub(PubSubError),
    }

    impl From<PubSubError> for WorkError {
        fn from(e: PubSubError) -> Self {
            WorkError::PubSub(e)
        }
    }

    fn test_producer(transport: &Arc<MemoryTransport>) -> Arc<Producer> {
        let topics = TopicTable::builder()
            .default_topic("foo-topic")
            .topic(BATCH_MEDIA_TYPE, "batch-topic")
            .build();
        Arc::new(
            Producer::builder(
                transport.clone(),
                Arc::new(MemoryCodecRegistry::json()),
                Arc::new(topics),
            )
            .build(),
        )
    }

    #[tokio::test]
    async fn test_deferred_success_flushes() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = test_producer(&transport);
        let observer = transport.clone();

        let value = deferred(&producer, |p| {
            Box::pin(async move {
                p.produce(FOO_MEDIA_TYPE, serde_json::json!({"n": 1})).await?;
                p.produce(FOO_MEDIA_TYPE, serde_json::json!({"n": 2})).await?;
                assert_eq!(observer.count().await, 0);
                Ok::<_, PubSubError>("done")
            })
        })
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(transport.count().await, 2);
    }

    #[tokio::test]
    async fn test_deferred_failure_discards_and_returns_original_error() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = test_producer(&transport);

        let result: std::result::Result<(), WorkError> = deferred(&producer, |p| {
            Box::pin(async move {
                p.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await?;
                Err(WorkError::Rejected)
            })
        })
        .await;

        assert!(matches!(result, Err(WorkError::Rejected)));
        assert_eq!(transport.count().await, 0);
    }

    #[tokio::test]
    async fn test_deferred_commit_failure_converted() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_with("down").await;
        let producer = test_producer(&transport);

        let result: std::result::Result<(), WorkError> = deferred(&producer, |p| {
            Box::pin(async move {
                p.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await?;
                Ok(())
            })
        })
        .await;

        assert!(matches!(result, Err(WorkError::PubSub(PubSubError::Publish { .. }))));
    }

    #[tokio::test]
    async fn test_deferred_batch_single_publish() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = test_producer(&transport);

        deferred_batch(&producer, |p| {
            Box::pin(async move {
                for i in 0..4 {
                    p.produce(FOO_MEDIA_TYPE, serde_json::json!({"i": i})).await?;
                }
                Ok::<_, PubSubError>(())
            })
        })
        .await
        .unwrap();

        let published = transport.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "batch-topic");
        assert_eq!(published[0].json().unwrap()["messages"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_cancelled_work_publishes_nothing() {
        let transport = Arc::new(MemoryTransport::new());
        let producer = test_producer(&transport);

        let work = deferred(&producer, |p| {
            Box::pin(async move {
                p.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await?;
                std::future::pending::<()>().await;
                Ok::<_, PubSubError>(())
            })
        });
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), work).await;

        assert!(timed_out.is_err());
        assert_eq!(transport.count().await, 0);
    }

    #[tokio::test]
    async fn test_scoped_producer_routes_by_task() {
        let transport = Arc::new(MemoryTransport::new());
        let handle = ScopedProducer::new(test_producer(&transport));

        assert!(!handle.is_deferring());
        let id = handle.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await.unwrap();
        assert!(id.is_some());
        assert_eq!(transport.count().await, 1);

        let inner = handle.clone();
        let observer = transport.clone();
        handle
            .deferred(|| async move {
                assert!(inner.is_deferring());
                let id = inner.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await?;
                assert!(id.is_none());

                // Other tasks are not affected by this task's scope
                let other = inner.clone();
                let spawned = tokio::spawn(async move {
                    other.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await
                })
                .await
                .unwrap()?;
                assert!(spawned.is_some());
                assert_eq!(observer.count().await, 2);
                Ok::<_, PubSubError>(())
            })
            .await
            .unwrap();

        assert!(!handle.is_deferring());
        assert_eq!(transport.count().await, 3);
    }

    #[tokio::test]
    async fn test_scoped_producer_failure_discards() {
        let transport = Arc::new(MemoryTransport::new());
        let handle = ScopedProducer::new(test_producer(&transport));

        let inner = handle.clone();
        let result: std::result::Result<(), WorkError> = handle
            .deferred_batch(|| async move {
                inner.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await?;
                Err(WorkError::Rejected)
            })
            .await;

        assert!(matches!(result, Err(WorkError::Rejected)));
        assert_eq!(transport.count().await, 0);
    }

    #[tokio::test]
    async fn test_nested_scope_discarded_with_outer_failure() {
        let transport = Arc::new(MemoryTransport::new());
        let handle = ScopedProducer::new(test_producer(&transport));

        let outer = handle.clone();
        let result: std::result::Result<(), WorkError> = handle
            .deferred(|| async move {
                let inner = outer.clone();
                outer
                    .deferred(|| async move {
                        inner.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await?;
                        Ok::<_, PubSubError>(())
                    })
                    .await?;
                Err(WorkError::Rejected)
            })
            .await;

        assert!(matches!(result, Err(WorkError::Rejected)));
        assert_eq!(transport.count().await, 0);
    }

    #[tokio::test]
    async fn test_nested_scope_commits_with_outer() {
        let transport = Arc::new(MemoryTransport::new());
        let handle = ScopedProducer::new(test_producer(&transport));
        let observer = transport.clone();

        let outer = handle.clone();
        handle
            .deferred_batch(|| async move {
                outer.produce(FOO_MEDIA_TYPE, serde_json::json!({"n": 1})).await?;
                let inner = outer.clone();
                outer
                    .deferred(|| async move {
                        inner.produce(FOO_MEDIA_TYPE, serde_json::json!({"n": 2})).await?;
                        Ok::<_, PubSubError>(())
                    })
                    .await?;
                assert_eq!(observer.count().await, 0);
                assert!(outer.is_deferring());
                Ok::<_, PubSubError>(())
            })
            .await
            .unwrap();

        let published = transport.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "batch-topic");
        assert_eq!(published[0].json().unwrap()["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scoped_producer_ignores_other_producers_scope() {
        let transport = Arc::new(MemoryTransport::new());
        let deferring = ScopedProducer::new(test_producer(&transport));
        let direct = ScopedProducer::new(test_producer(&transport));

        let inner = direct.clone();
        deferring
            .deferred(|| async move {
                assert!(!inner.is_deferring());
                inner.produce(FOO_MEDIA_TYPE, serde_json::json!({})).await?;
                Ok::<_, PubSubError>(())
            })
            .await
            .unwrap();

        assert_eq!(transport.count().await, 1);
    }
}
