//! De-duplication of identical in-flight calls.
//!
//! The first caller for a key runs the work; everyone who arrives while it
//! is running awaits the same shared future and gets a clone of its result.
//! The entry disappears as soon as the work finishes, so a later caller
//! starts fresh (and, for cacheable requests, finds the cached value).

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};

type Flights<K, T> = Arc<Mutex<HashMap<K, Shared<BoxFuture<'static, T>>>>>;

/// Registry of in-flight calls keyed by `K`.
pub struct SingleFlight<K, T> {
    flights: Flights<K, T>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `work` for `key`, or join the call already running for it.
    ///
    /// Returns the result and whether this caller joined an existing call.
    /// `work` is dropped unpolled when this caller joins. If every waiter
    /// gives up, the registered call is resumed by the next caller for `key`.
    pub async fn run<F>(&self, key: K, work: F) -> (T, bool)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (shared, joined) = {
            let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
            match flights.get(&key) {
                Some(existing) => (existing.clone(), true),
                None => {
                    let registry = Arc::clone(&self.flights);
                    let cleanup_key = key.clone();
                    let shared = async move {
                        let value = work.await;
                        registry
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&cleanup_key);
                        value
                    }
                    .boxed()
                    .shared();
                    flights.insert(key, shared.clone());
                    (shared, false)
                }
            }
        };
        (shared.await, joined)
    }

    /// Number of calls currently in flight.
    pub fn len(&self) -> usize {
        self.flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
