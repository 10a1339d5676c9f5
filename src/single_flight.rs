//! Keyed single-flight registry.
//!
//! Concurrent callers asking for the same key share one in-progress future
//! instead of starting their own. The entry is dropped as soon as the shared
//! result has resolved, so the next caller for that key starts a fresh run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

type Flight<T> = Shared<BoxFuture<'static, T>>;

pub struct SingleFlight<T: Clone> {
    in_flight: Mutex<HashMap<&'static str, Flight<T>>>,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `make()` under `key`, or join the run already in progress.
    ///
    /// `make` is only called when no run for `key` is in flight. Every caller
    /// receives a clone of the same output.
    pub async fn run<F, Fut>(&self, key: &'static str, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(key) {
                Some(existing) => {
                    tracing::debug!(key, "joining in-flight operation");
                    existing.clone()
                }
                None => {
                    let flight = make().boxed().shared();
                    in_flight.insert(key, flight.clone());
                    flight
                }
            }
        };

        let output = flight.clone().await;

        // Any finisher may clear the entry, but only if it is still this run.
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.get(key).is_some_and(|current| current.ptr_eq(&flight)) {
            in_flight.remove(key);
        }

        output
    }

    /// Whether a run for `key` is currently registered.
    #[must_use]
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let flights = Arc::new(SingleFlight::<u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let flights = flights.clone();
                let runs = runs.clone();
                tokio::spawn(async move {
                    flights
                        .run("refresh", move || async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            7
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), 7);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!flights.is_in_flight("refresh"));
    }

    #[tokio::test]
    async fn test_entry_is_cleared_after_resolution() {
        let flights = SingleFlight::<usize>::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for expected in 1..=3 {
            let runs = runs.clone();
            let out = flights
                .run("refresh", move || async move { runs.fetch_add(1, Ordering::SeqCst) + 1 })
                .await;
            assert_eq!(out, expected);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_share() {
        let flights = SingleFlight::<&'static str>::new();
        let (a, b) = tokio::join!(
            flights.run("a", || async { "a" }),
            flights.run("b", || async { "b" }),
        );
        assert_eq!((a, b), ("a", "b"));
    }
}
