//! Write-Back Strategy
//!
//! Persists entries to a backing store when they leave the cache, rather
//! than on every write.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::cache::{Cache, EvictionReason, ExpiringStore, ObserverId};
use crate::error::{BoxError, CacheError, Result};

// == Persister Contract ==
/// Backing store that receives evicted entries.
#[async_trait]
pub trait Persister: Send + Sync + 'static {
    async fn store(&self, key: &str, value: &[u8]) -> std::result::Result<(), BoxError>;
}

/// [`Persister`] backed by an async closure. Built with [`persister_fn`].
#[derive(Debug, Clone)]
pub struct PersisterFn<F>(F);

/// Wraps `f(key, value)` as a [`Persister`].
pub fn persister_fn<F, Fut>(f: F) -> PersisterFn<F>
where
    F: Fn(String, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send,
{
    PersisterFn(f)
}

#[async_trait]
impl<F, Fut> Persister for PersisterFn<F>
where
    F: Fn(String, Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send,
{
    async fn store(&self, key: &str, value: &[u8]) -> std::result::Result<(), BoxError> {
        (self.0)(key.to_owned(), value.to_vec()).await
    }
}

enum Job {
    Persist { key: String, value: Vec<u8> },
    Flush(oneshot::Sender<()>),
}

struct Failure {
    key: String,
    source: BoxError,
}

type Failures = Arc<Mutex<Vec<Failure>>>;

// == Write Back Cache ==
/// Write-back layer over an [`ExpiringStore`].
///
/// Every eviction the store reports, whatever its cause, is queued and
/// handed to the persister on a dedicated task. Persist failures are
/// logged and kept until the next [`flush`](Self::flush), which returns
/// them as [`CacheError::WriteBack`].
pub struct WriteBackCache<C = Arc<ExpiringStore>> {
    inner: C,
    store: Arc<ExpiringStore>,
    observer_id: ObserverId,
    jobs: mpsc::UnboundedSender<Job>,
    failures: Failures,
    persisted: Arc<AtomicU64>,
}

impl WriteBackCache<Arc<ExpiringStore>> {
    /// Attaches write-back to `store`. Requires a running tokio runtime.
    pub fn new<P: Persister>(store: Arc<ExpiringStore>, persister: P) -> Result<Self> {
        Self::layered(Arc::clone(&store), store, persister)
    }
}

impl<C: Cache> WriteBackCache<C> {
    /// Attaches write-back to `store`, forwarding cache calls to `inner`.
    pub fn layered<P: Persister>(inner: C, store: Arc<ExpiringStore>, persister: P) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            CacheError::Config("write-back requires a running tokio runtime".to_string())
        })?;

        let (jobs, queue) = mpsc::unbounded_channel();
        let failures: Failures = Arc::new(Mutex::new(Vec::new()));
        let persisted = Arc::new(AtomicU64::new(0));
        runtime.spawn(run_worker(
            persister,
            queue,
            Arc::clone(&failures),
            Arc::clone(&persisted),
        ));

        let sender = jobs.clone();
        let lost = Arc::clone(&failures);
        let observer_id = store.observers().register(
            "write-back",
            Arc::new(move |key: &str, value: &[u8], reason: EvictionReason| {
                let job = Job::Persist {
                    key: key.to_owned(),
                    value: value.to_vec(),
                };
                if sender.send(job).is_err() {
                    error!(key, %reason, "write-back worker stopped, entry not persisted");
                    lost.lock().push(Failure {
                        key: key.to_owned(),
                        source: "write-back worker stopped".into(),
                    });
                }
            }),
        );

        Ok(Self {
            inner,
            store,
            observer_id,
            jobs,
            failures,
            persisted,
        })
    }

    /// Number of entries successfully persisted so far.
    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    /// Waits until everything queued so far has been handed to the
    /// persister, then reports failures collected since the last flush.
    pub async fn flush(&self) -> Result<()> {
        let (done, waiting) = oneshot::channel();
        self.jobs
            .send(Job::Flush(done))
            .map_err(|_| CacheError::Internal("write-back worker stopped".to_string()))?;
        waiting
            .await
            .map_err(|_| CacheError::Internal("write-back worker stopped".to_string()))?;

        let failures = std::mem::take(&mut *self.failures.lock());
        let failed = failures.len();
        match failures.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(CacheError::WriteBack {
                failed,
                key: first.key,
                source: first.source,
            }),
        }
    }

    /// Persists every resident entry, then flushes.
    ///
    /// Entries stay in the store and other observers are not notified;
    /// shutting the store down is a separate step.
    pub async fn close(&self) -> Result<()> {
        let resident = self.store.snapshot().await;
        let count = resident.len();
        for (key, value) in resident {
            self.jobs
                .send(Job::Persist { key, value })
                .map_err(|_| CacheError::Internal("write-back worker stopped".to_string()))?;
        }
        info!(entries = count, "write-back flushing resident entries");
        self.flush().await
    }
}

impl<C> Drop for WriteBackCache<C> {
    fn drop(&mut self) {
        // Dropping the last sender lets the worker drain and exit.
        self.store.observers().unregister(self.observer_id);
    }
}

async fn run_worker<P: Persister>(
    persister: P,
    mut queue: mpsc::UnboundedReceiver<Job>,
    failures: Failures,
    persisted: Arc<AtomicU64>,
) {
    while let Some(job) = queue.recv().await {
        match job {
            Job::Persist { key, value } => match persister.store(&key, &value).await {
                Ok(()) => {
                    persisted.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, size = value.len(), "persisted evicted entry");
                }
                Err(source) => {
                    error!(key = %key, error = %source, "failed to persist evicted entry");
                    failures.lock().push(Failure { key, source });
                }
            },
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("write-back worker stopped");
}

#[async_trait]
impl<C: Cache> Cache for WriteBackCache<C> {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    async fn load_and_delete(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.load_and_delete(key).await
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        self.inner.contains(key).await
    }
}
