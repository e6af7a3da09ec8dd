//! Revalidating read-through cache for the two backend collections.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               ResourceCache                  │
//! │  ┌───────────────────┐ ┌──────────────────┐  │
//! │  │ credentials       │ │ connector-       │  │
//! │  │ Collection<Cred>  │ │ indexing-statuses│  │
//! │  └─────────┬─────────┘ └────────┬─────────┘  │
//! └────────────┼────────────────────┼────────────┘
//!              ↓ invalidate()       ↓ (timer or mutation)
//!        in-flight fetch per key, shared until its request is sent
//!              ↓                    ↓
//!        watch::Sender::send_replace(whole snapshot)
//! ```
//!
//! Each collection holds a [`Snapshot`]: `Loading`, `Ready` or `Failed`.
//! A refetch replaces the snapshot wholesale; entries are never patched in
//! place, so readers never see a half-applied mutation. The two collections
//! are independent: there is no cross-collection transaction.
//!
//! Fetches run on their own task. A caller that stops waiting does not
//! cancel the fetch; its result is still published to every subscriber.
//! Every fetch carries a sequence number and a response is published only if
//! no later fetch has published already, so an `invalidate` issued after a
//! write never ends with a snapshot read before that write.

use crate::api::{ApiError, BackendApi};
use crate::connectors::IndexingStatus;
use crate::credentials::Credential;
use crate::error::{ConsoleError, ValidationError};
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{Stream, StreamExt};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

/// Name of a cached collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Credentials,
    IndexingStatuses,
}

impl CacheKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::Credentials => "credentials",
            CacheKey::IndexingStatuses => "connector-indexing-statuses",
        }
    }

    /// Operator-facing name ("Failed to load connectors").
    pub fn label(&self) -> &'static str {
        match self {
            CacheKey::Credentials => "credentials",
            CacheKey::IndexingStatuses => "connectors",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a reader observes for a collection. Exactly one state holds.
#[derive(Debug)]
pub enum Snapshot<T> {
    /// Nothing fetched yet.
    Loading,
    Ready(Arc<Vec<T>>),
    /// The latest fetch failed.
    Failed(String),
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        match self {
            Snapshot::Loading => Snapshot::Loading,
            Snapshot::Ready(items) => Snapshot::Ready(Arc::clone(items)),
            Snapshot::Failed(msg) => Snapshot::Failed(msg.clone()),
        }
    }
}

impl<T> Snapshot<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Snapshot::Loading)
    }

    pub fn data(&self) -> Option<&Arc<Vec<T>>> {
        match self {
            Snapshot::Ready(items) => Some(items),
            _ => None,
        }
    }

    /// Converts to the collection or the error the operator should see.
    pub fn into_result(self, key: CacheKey) -> Result<Arc<Vec<T>>, ConsoleError> {
        match self {
            Snapshot::Ready(items) => Ok(items),
            Snapshot::Loading => Err(ValidationError::NotLoaded(key).into()),
            Snapshot::Failed(message) => Err(ConsoleError::Load {
                resource: key,
                message,
            }),
        }
    }
}

type FetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<T>, ApiError>> + Send + Sync>;
type SharedFetch<T> = Shared<BoxFuture<'static, Snapshot<T>>>;

struct InflightFetch<T> {
    seq: u64,
    /// Set once the request has been sent. Invalidations arriving later
    /// must not join it: the backend may have answered before their mutation.
    issued: bool,
    result: SharedFetch<T>,
}

struct FetchSlots<T> {
    next_seq: u64,
    /// Sequence number of the fetch behind the current snapshot.
    published_seq: u64,
    inflight: Option<InflightFetch<T>>,
}

struct CollectionInner<T> {
    key: CacheKey,
    fetch: FetchFn<T>,
    state: watch::Sender<Snapshot<T>>,
    slots: Mutex<FetchSlots<T>>,
}

impl<T: Send + Sync + 'static> CollectionInner<T> {
    fn slots(&self) -> MutexGuard<'_, FetchSlots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refetch(self: Arc<Self>, seq: u64) -> Snapshot<T> {
        if let Some(pending) = self.slots().inflight.as_mut().filter(|p| p.seq == seq) {
            pending.issued = true;
        }

        debug!(key = %self.key, seq, "Refetching collection");
        let snapshot = match (self.fetch)().await {
            Ok(items) => {
                debug!(key = %self.key, count = items.len(), "Collection fetched");
                Snapshot::Ready(Arc::new(items))
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Collection fetch failed");
                Snapshot::Failed(e.to_string())
            }
        };

        let mut slots = self.slots();
        if slots.inflight.as_ref().map_or(false, |p| p.seq == seq) {
            slots.inflight = None;
        }
        if seq > slots.published_seq {
            slots.published_seq = seq;
            self.state.send_replace(snapshot);
        } else {
            debug!(
                key = %self.key,
                seq,
                published_seq = slots.published_seq,
                "Discarding response older than the published snapshot"
            );
        }
        let current = self.state.borrow().clone();
        current
    }
}

/// One cached collection.
pub struct Collection<T> {
    inner: Arc<CollectionInner<T>>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> Collection<T> {
    pub fn new<F>(key: CacheKey, fetch: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<Vec<T>, ApiError>> + Send + Sync + 'static,
    {
        let (state, _) = watch::channel(Snapshot::Loading);
        Self {
            inner: Arc::new(CollectionInner {
                key,
                fetch: Arc::new(fetch),
                state,
                slots: Mutex::new(FetchSlots {
                    next_seq: 0,
                    published_seq: 0,
                    inflight: None,
                }),
            }),
        }
    }

    pub fn key(&self) -> CacheKey {
        self.inner.key
    }

    /// Current snapshot without triggering a fetch.
    pub fn snapshot(&self) -> Snapshot<T> {
        self.inner.state.borrow().clone()
    }

    /// Read-through: fetches only if nothing has been fetched yet.
    pub async fn fetch(&self) -> Snapshot<T> {
        match self.snapshot() {
            Snapshot::Loading => self.revalidate().await,
            current => current,
        }
    }

    /// Forces a refetch that observes every write completed before the call.
    ///
    /// Joins an in-flight fetch only while its request has not been sent yet;
    /// otherwise starts a new one. Returns the published snapshot.
    pub async fn invalidate(&self) -> Snapshot<T> {
        self.request(false).await
    }

    /// Refetches, joining any in-flight fetch. Used by the timer and the
    /// first read, where freshness relative to a write does not matter.
    pub async fn revalidate(&self) -> Snapshot<T> {
        self.request(true).await
    }

    fn request(&self, join_sent: bool) -> SharedFetch<T> {
        let mut slots = self.inner.slots();
        if let Some(pending) = slots.inflight.as_ref() {
            if join_sent || !pending.issued {
                return pending.result.clone();
            }
        }

        slots.next_seq += 1;
        let seq = slots.next_seq;
        let inner = Arc::clone(&self.inner);
        let key = inner.key;
        let handle = tokio::spawn(inner.refetch(seq));
        let result = async move {
            handle.await.unwrap_or_else(|e| {
                Snapshot::Failed(format!("{} fetch task failed: {}", key, e))
            })
        }
        .boxed()
        .shared();
        slots.inflight = Some(InflightFetch {
            seq,
            issued: false,
            result: result.clone(),
        });
        result
    }

    /// Receiver notified on every snapshot swap.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.inner.state.subscribe()
    }

    /// Revalidates on a fixed interval. The first fetch happens immediately.
    pub fn spawn_revalidation(&self, every: Duration) -> JoinHandle<()> {
        let collection = self.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(every);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                collection.revalidate().await;
            }
        })
    }
}

/// Process-wide cache of the credential and indexing-status collections.
///
/// Shared by `Arc` between every view rendering the same resources.
pub struct ResourceCache {
    credentials: Collection<Credential>,
    indexing_statuses: Collection<IndexingStatus>,
    revalidation: Mutex<Vec<JoinHandle<()>>>,
}

impl ResourceCache {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        let credentials_backend = Arc::clone(&backend);
        let credentials = Collection::new(CacheKey::Credentials, move || {
            let backend = Arc::clone(&credentials_backend);
            async move { backend.list_credentials().await }.boxed()
        });

        let indexing_statuses = Collection::new(CacheKey::IndexingStatuses, move || {
            let backend = Arc::clone(&backend);
            async move { backend.list_indexing_statuses().await }.boxed()
        });

        Self {
            credentials,
            indexing_statuses,
            revalidation: Mutex::new(Vec::new()),
        }
    }

    pub fn credentials(&self) -> &Collection<Credential> {
        &self.credentials
    }

    pub fn indexing_statuses(&self) -> &Collection<IndexingStatus> {
        &self.indexing_statuses
    }

    /// Forces a refetch of `key`. The only mutation primitive of the cache.
    pub async fn invalidate(&self, key: CacheKey) {
        let failed = match key {
            CacheKey::Credentials => matches!(self.credentials.invalidate().await, Snapshot::Failed(_)),
            CacheKey::IndexingStatuses => {
                matches!(self.indexing_statuses.invalidate().await, Snapshot::Failed(_))
            }
        };
        if failed {
            warn!(key = %key, "Revalidation after mutation failed, keeping error state");
        }
    }

    /// Read-through fetch of both collections, concurrently.
    pub async fn fetch_all(&self) -> (Snapshot<Credential>, Snapshot<IndexingStatus>) {
        tokio::join!(self.credentials.fetch(), self.indexing_statuses.fetch())
    }

    /// Starts background revalidation of both collections.
    ///
    /// Replaces any revalidation loops started earlier.
    pub fn start_revalidation(&self, credentials_every: Duration, statuses_every: Duration) {
        let mut handles = self
            .revalidation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for handle in handles.drain(..) {
            handle.abort();
        }
        handles.push(self.credentials.spawn_revalidation(credentials_every));
        handles.push(self.indexing_statuses.spawn_revalidation(statuses_every));
    }

    pub fn stop_revalidation(&self) {
        let mut handles = self
            .revalidation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for handle in handles.drain(..) {
            handle.abort();
        }
    }

    /// Yields the key of every collection whose snapshot was swapped.
    ///
    /// Each collection yields once immediately with its current snapshot.
    pub fn changes(&self) -> impl Stream<Item = CacheKey> + Send + Unpin + 'static {
        let credentials =
            WatchStream::new(self.credentials.subscribe()).map(|_| CacheKey::Credentials);
        let statuses = WatchStream::new(self.indexing_statuses.subscribe())
            .map(|_| CacheKey::IndexingStatuses);
        futures::stream::select(credentials, statuses)
    }
}

impl Drop for ResourceCache {
    fn drop(&mut self) {
        self.stop_revalidation();
    }
}
