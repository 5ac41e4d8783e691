//! Per-key single-flight coordination.
//!
//! The refresh engine takes one of these locks before calling an adapter
//! and releases it after the cache write. Lock release is RAII, so every
//! exit path, including cancellation, frees the key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Clone, Default)]
struct FlightState {
    lock: Arc<AsyncMutex<()>>,
    completed_at: Arc<Mutex<Option<Instant>>>,
}

/// Keyed lock table. Holding a [`FlightGuard`] means no other refresh runs
/// for the same canonical cache key.
#[derive(Default)]
pub struct FlightGroup {
    flights: Mutex<HashMap<String, FlightState>>,
}

impl FlightGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until this caller is the only flight for `key`.
    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let state = {
            let mut flights = self.flights.lock().expect("flight table is not poisoned");
            flights.entry(key.to_owned()).or_default().clone()
        };
        let guard = state.lock.clone().lock_owned().await;
        FlightGuard {
            _guard: guard,
            completed_at: state.completed_at,
        }
    }
}

/// Exclusive flight for one key.
pub struct FlightGuard {
    _guard: OwnedMutexGuard<()>,
    completed_at: Arc<Mutex<Option<Instant>>>,
}

impl FlightGuard {
    /// Whether another flight for this key finished at or after `since`.
    /// Callers that started waiting before that completion consume the
    /// cached result instead of repeating the adapter call.
    pub fn completed_since(&self, since: Instant) -> bool {
        self.completed_at
            .lock()
            .expect("flight completion slot is not poisoned")
            .is_some_and(|done| done >= since)
    }

    /// Records a successful refresh so queued waiters can coalesce onto it.
    pub fn mark_complete(&self) {
        *self
            .completed_at
            .lock()
            .expect("flight completion slot is not poisoned") = Some(Instant::now());
    }
}
