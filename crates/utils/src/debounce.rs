use std::{
    collections::HashMap,
    hash::Hash,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};

type SharedResult<V, E> = Shared<BoxFuture<'static, Result<V, Arc<E>>>>;

/// Coalesces bursts of calls per key into a bounded number of executions.
///
/// A call on an idle key runs immediately. Calls arriving while a run is in
/// flight do not start their own run; they all await a single follow-up run
/// that starts once the current one finishes. A burst of any size therefore
/// costs at most two executions: the one that was already running and one
/// follow-up that is guaranteed to start after every burst member arrived.
#[async_trait]
pub trait Coalescer<K, V, E>: Send + Sync
where
    K: Send + 'static,
    V: Send + 'static,
    E: Send + Sync + 'static,
{
    async fn run(&self, key: K, work: BoxFuture<'static, Result<V, E>>) -> Result<V, Arc<E>>;
}

struct Entry<V, E> {
    current_id: u64,
    current: SharedResult<V, E>,
    queued: Option<(u64, SharedResult<V, E>)>,
}

/// In-memory [`Coalescer`] over a per-key state map.
///
/// Runs execute on detached tasks (a caller that stops waiting does not
/// cancel anything); the queued follow-up gates on the current run's shared
/// result, so it begins strictly after the current run completes.
pub struct KeyedDebounce<K, V, E> {
    entries: Arc<Mutex<HashMap<K, Entry<V, E>>>>,
    next_id: AtomicU64,
}

impl<K, V, E> KeyedDebounce<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Number of keys that currently have a run in flight.
    pub fn active(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn attach(&self, key: K, work: BoxFuture<'static, Result<V, E>>) -> SharedResult<V, E> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&key) {
            None => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let shared = self.spawn_run(key.clone(), id, None, work);
                entries.insert(
                    key,
                    Entry {
                        current_id: id,
                        current: shared.clone(),
                        queued: None,
                    },
                );
                shared
            }
            Some(entry) => {
                if let Some((_, queued)) = &entry.queued {
                    // A follow-up is already pending; this burst member
                    // rides along and its own work closure is dropped.
                    return queued.clone();
                }
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let gate = entry.current.clone();
                let shared = self.spawn_run(key.clone(), id, Some(gate), work);
                entry.queued = Some((id, shared.clone()));
                shared
            }
        }
    }

    fn spawn_run(
        &self,
        key: K,
        id: u64,
        gate: Option<SharedResult<V, E>>,
        work: BoxFuture<'static, Result<V, E>>,
    ) -> SharedResult<V, E> {
        let entries = Arc::clone(&self.entries);
        let task = tokio::spawn(async move {
            if let Some(gate) = gate {
                // Outcome of the previous run is irrelevant; only its
                // completion is.
                let _ = gate.await;
            }
            work.await
        });
        async move {
            let result = match task.await {
                Ok(result) => result.map_err(Arc::new),
                // Detached tasks are never aborted, so a join error is a
                // propagated panic from `work`.
                Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
            };
            let mut entries = entries.lock().unwrap();
            if let Some(entry) = entries.get_mut(&key) {
                if entry.current_id == id {
                    match entry.queued.take() {
                        Some((queued_id, queued)) => {
                            entry.current_id = queued_id;
                            entry.current = queued;
                        }
                        None => {
                            entries.remove(&key);
                        }
                    }
                }
            }
            result
        }
        .boxed()
        .shared()
    }
}

impl<K, V, E> Default for KeyedDebounce<K, V, E>
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
impl<K, V, E> Coalescer<K, V, E> for KeyedDebounce<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    async fn run(&self, key: K, work: BoxFuture<'static, Result<V, E>>) -> Result<V, Arc<E>> {
        self.attach(key, work).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::{Duration, Instant},
    };

    use futures::FutureExt;
    use futures::future::join_all;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn debounce() -> Arc<KeyedDebounce<&'static str, u64, Boom>> {
        Arc::new(KeyedDebounce::new())
    }

    #[tokio::test]
    async fn idle_key_runs_immediately() {
        let debounce = debounce();
        let value = debounce
            .run("repo", async { Ok(11) }.boxed())
            .await
            .unwrap();
        assert_eq!(value, 11);
        assert_eq!(debounce.active(), 0);
    }

    #[tokio::test]
    async fn sequential_calls_each_run() {
        let debounce = debounce();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            debounce
                .run(
                    "repo",
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(0)
                    }
                    .boxed(),
                )
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn burst_coalesces_to_exactly_two_runs() {
        let debounce = debounce();
        let calls = Arc::new(AtomicUsize::new(0));

        let first_calls = Arc::clone(&calls);
        let first = {
            let debounce = Arc::clone(&debounce);
            tokio::spawn(async move {
                debounce
                    .run(
                        "repo",
                        async move {
                            first_calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(80)).await;
                            Ok(1)
                        }
                        .boxed(),
                    )
                    .await
            })
        };

        // Let the first run start before the burst arrives.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let burst = (0..5).map(|n| {
            let debounce = Arc::clone(&debounce);
            let calls = Arc::clone(&calls);
            async move {
                debounce
                    .run(
                        "repo",
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(100 + n)
                        }
                        .boxed(),
                    )
                    .await
            }
        });
        let burst_results = join_all(burst).await;

        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Every burst member awaited the single follow-up run, which executed
        // the first queued caller's work.
        for result in burst_results {
            assert_eq!(result.unwrap(), 100);
        }
    }

    #[tokio::test]
    async fn follow_up_starts_after_current_finishes() {
        let debounce = debounce();
        let first_done = Arc::new(Mutex::new(None::<Instant>));
        let second_started = Arc::new(Mutex::new(None::<Instant>));

        let done = Arc::clone(&first_done);
        let first = {
            let debounce = Arc::clone(&debounce);
            tokio::spawn(async move {
                debounce
                    .run(
                        "repo",
                        async move {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            *done.lock().unwrap() = Some(Instant::now());
                            Ok(0)
                        }
                        .boxed(),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let started = Arc::clone(&second_started);
        let second = debounce.run(
            "repo",
            async move {
                *started.lock().unwrap() = Some(Instant::now());
                Ok(0)
            }
            .boxed(),
        );

        second.await.unwrap();
        first.await.unwrap().unwrap();

        let done = first_done.lock().unwrap().expect("first finished");
        let started = second_started.lock().unwrap().expect("second started");
        assert!(started >= done);
    }

    #[tokio::test]
    async fn calls_during_follow_up_queue_one_more() {
        let debounce = debounce();
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = |calls: Arc<AtomicUsize>| -> BoxFuture<'static, Result<u64, Boom>> {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(60)).await;
                Ok(0)
            }
            .boxed()
        };

        let first = {
            let debounce = Arc::clone(&debounce);
            let work = slow(Arc::clone(&calls));
            tokio::spawn(async move { debounce.run("repo", work).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = {
            let debounce = Arc::clone(&debounce);
            let work = slow(Arc::clone(&calls));
            tokio::spawn(async move { debounce.run("repo", work).await })
        };

        // Wait until the follow-up is the one running, then trigger again.
        tokio::time::sleep(Duration::from_millis(80)).await;
        let third = debounce.run("repo", slow(Arc::clone(&calls)));

        third.await.unwrap();
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(debounce.active(), 0);
    }
}
