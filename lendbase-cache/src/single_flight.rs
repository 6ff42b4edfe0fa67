//! Single-flight load coalescing
//!
//! Collapses concurrent cache misses for one identity into a single
//! backend load: the first caller becomes the leader and runs the loader,
//! every concurrent caller subscribes to the leader's broadcast channel
//! and observes the same result, value or error. The coordinator is
//! internal to one repository instance and is not cross-process.

use std::future::Future;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lendbase_core::{EntityId, StoreResult};
use tokio::sync::broadcast;

type FlightResult<V> = StoreResult<Option<V>>;

/// Per-key coalescing table, keyed by entity identity.
///
/// Unrelated identities proceed independently; within one identity at
/// most one loader runs at a time. Waiters whose leader was cancelled
/// before publishing retry, and one of them becomes the next leader.
pub struct SingleFlight<V: Clone> {
    inflight: DashMap<EntityId, broadcast::Sender<FlightResult<V>>>,
}

/// Removes the in-flight entry when the leader finishes or is cancelled.
/// Dropping the map's sender clone is what wakes abandoned waiters.
struct FlightGuard<'a, V: Clone> {
    inflight: &'a DashMap<EntityId, broadcast::Sender<FlightResult<V>>>,
    key: EntityId,
}

impl<V: Clone> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}

impl<V: Clone + Send + 'static> SingleFlight<V> {
    /// Create an empty coalescing table.
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Number of loads currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Run `load` for `key`, coalescing with any concurrent call for the
    /// same key. Exactly one caller executes the loader; all others await
    /// its shared result.
    pub async fn run<F, Fut>(&self, key: EntityId, load: F) -> FlightResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlightResult<V>>,
    {
        let tx = loop {
            // Waiter path: subscribe while the map reference pins the
            // entry, so the leader cannot remove-and-publish in between.
            if let Some(existing) = self.inflight.get(&key) {
                let mut rx = existing.subscribe();
                drop(existing);
                match rx.recv().await {
                    Ok(result) => return result,
                    // Leader dropped without publishing; retry, possibly
                    // becoming the next leader.
                    Err(_) => continue,
                }
            }

            match self.inflight.entry(key) {
                Entry::Occupied(occupied) => {
                    // Lost the election to a concurrent caller.
                    let mut rx = occupied.get().subscribe();
                    drop(occupied);
                    match rx.recv().await {
                        Ok(result) => return result,
                        Err(_) => continue,
                    }
                }
                Entry::Vacant(vacant) => {
                    let (tx, _rx) = broadcast::channel(1);
                    vacant.insert(tx.clone());
                    break tx;
                }
            }
        };

        let guard = FlightGuard {
            inflight: &self.inflight,
            key,
        };
        let result = load().await;
        // Release the key before publishing: a caller arriving after the
        // publish starts a fresh flight instead of receiving a closed
        // channel.
        drop(guard);
        let _ = tx.send(result.clone());
        result
    }
}

impl<V: Clone + Send + 'static> Default for SingleFlight<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendbase_core::StoreError;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_caller_runs_loader() {
        let flight: SingleFlight<String> = SingleFlight::new();
        let result = flight
            .run(7, || async { Ok(Some("seven".to_string())) })
            .await
            .unwrap();
        assert_eq!(result.as_deref(), Some("seven"));
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_load() {
        let flight: Arc<SingleFlight<u64>> = Arc::new(SingleFlight::new());
        let loads = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let flight = Arc::clone(&flight);
            let loads = Arc::clone(&loads);
            handles.push(tokio::spawn(async move {
                flight
                    .run(7, || async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        // Hold the flight open long enough for the other
                        // callers to pile up behind it.
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Some(42u64))
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result, Some(42));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_errors_are_shared_with_waiters() {
        let flight: Arc<SingleFlight<u64>> = Arc::new(SingleFlight::new());
        let loads = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let loads = Arc::clone(&loads);
            handles.push(tokio::spawn(async move {
                flight
                    .run(9, || async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(StoreError::backend("connection reset"))
                    })
                    .await
            }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(err, StoreError::backend("connection reset"));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flight: Arc<SingleFlight<u64>> = Arc::new(SingleFlight::new());
        let loads = Arc::new(AtomicU64::new(0));

        let a = {
            let loads = Arc::clone(&loads);
            flight.run(1, || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(Some(1u64))
            })
        };
        let b = {
            let loads = Arc::clone(&loads);
            flight.run(2, || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(Some(2u64))
            })
        };

        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), Some(1));
        assert_eq!(b.unwrap(), Some(2));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_leader_releases_the_key() {
        let flight: Arc<SingleFlight<u64>> = Arc::new(SingleFlight::new());

        let leader = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move {
                flight
                    .run(5, || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(Some(5u64))
                    })
                    .await
            })
        };

        // Let the leader take the key, then cancel it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();
        let _ = leader.await;

        // The key must be free again; a new caller completes promptly.
        let result = flight.run(5, || async { Ok(Some(99u64)) }).await.unwrap();
        assert_eq!(result, Some(99));
        assert_eq!(flight.in_flight(), 0);
    }
}
