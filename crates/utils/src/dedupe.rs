use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};

type SharedResult<V, E> = Shared<BoxFuture<'static, Result<V, Arc<E>>>>;

/// Collapses concurrent identical computations by key.
///
/// While a computation for a key is in flight, additional callers attach to it
/// instead of starting their own, and every attached caller observes the same
/// outcome, failures included. Completion evicts the key, so the next call
/// after that starts a fresh computation.
///
/// Implementations are keyed per logical resource and may be process-local; a
/// distributed deployment can substitute a lease-backed implementation.
#[async_trait]
pub trait Singleflight<K, V, E>: Send + Sync
where
    K: Send + 'static,
    V: Send + 'static,
    E: Send + Sync + 'static,
{
    async fn run(&self, key: K, work: BoxFuture<'static, Result<V, E>>) -> Result<V, Arc<E>>;
}

/// In-memory [`Singleflight`]: one shared in-flight computation per key.
///
/// Work runs on a detached task, so a caller that stops waiting does not
/// cancel it; the result stays available to the next caller of the same key
/// until someone observes completion, which evicts the entry.
pub struct KeyedDedupe<K, V, E> {
    inflight: Arc<Mutex<HashMap<K, SharedResult<V, E>>>>,
}

impl<K, V, E> KeyedDedupe<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of keys with an in-flight computation.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }

    fn attach(&self, key: K, work: BoxFuture<'static, Result<V, E>>) -> SharedResult<V, E> {
        let mut inflight = self.inflight.lock().unwrap();
        if let Some(existing) = inflight.get(&key) {
            return existing.clone();
        }
        let shared = spawn_shared(Arc::clone(&self.inflight), key.clone(), work);
        inflight.insert(key, shared.clone());
        shared
    }
}

impl<K, V, E> Default for KeyedDedupe<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V, E> Singleflight<K, V, E> for KeyedDedupe<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    async fn run(&self, key: K, work: BoxFuture<'static, Result<V, E>>) -> Result<V, Arc<E>> {
        self.attach(key, work).await
    }
}

/// Run `work` on a detached task and wrap the join in a shared future that
/// evicts `key` once completion has been observed.
fn spawn_shared<K, V, E>(
    inflight: Arc<Mutex<HashMap<K, SharedResult<V, E>>>>,
    key: K,
    work: BoxFuture<'static, Result<V, E>>,
) -> SharedResult<V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let task = tokio::spawn(work);
    async move {
        let result = match task.await {
            Ok(result) => result.map_err(Arc::new),
            // Detached tasks are never aborted, so a join error is a
            // propagated panic from `work`.
            Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
        };
        inflight.lock().unwrap().remove(&key);
        result
    }
    .boxed()
    .shared()
}
