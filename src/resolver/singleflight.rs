//! Per-key request coalescing
//!
//! The first caller for a key spawns the work; later callers for the same key
//! await the same shared result. The work runs as its own task, so it
//! finishes and fills the caches even if every caller stops waiting.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::{ResolveError, Result};

type Flight<T> = Shared<BoxFuture<'static, Result<T>>>;

pub(crate) struct SingleFlight<T: Clone + Send + Sync + 'static> {
    in_flight: Arc<Mutex<HashMap<String, Flight<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Join the flight for `key`, starting `work` if none is running
    pub(crate) fn run<F>(&self, key: &str, work: F) -> Flight<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock();
        if let Some(flight) = in_flight.get(key) {
            tracing::debug!(key = key, "Joining in-flight request");
            return flight.clone();
        }

        let registry = self.in_flight.clone();
        let owned_key = key.to_string();
        // the map lock is held until the flight is registered, so the
        // task's removal always runs after the insert below
        let handle = tokio::spawn(async move {
            let outcome = work.await;
            registry.lock().remove(&owned_key);
            outcome
        });

        let flight = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ResolveError::from(e)),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(key.to_string(), flight.clone());
        flight
    }

    pub(crate) fn len(&self) -> usize {
        self.in_flight.lock().len()
    }
}
