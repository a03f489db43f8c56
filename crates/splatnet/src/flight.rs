//! Keyed single-flight cycles
//!
//! A cycle is one attempt at producing a value for a key. The first caller
//! for a key becomes the leader and runs the work; callers that arrive while
//! the cycle is open become waiters on that exact cycle and receive a clone
//! of its outcome. Once the leader finishes, the key is removed, so the next
//! caller opens a fresh cycle and never sees a finished cycle's outcome.
//!
//! The map lock is held only to look up, insert or remove an entry. Waiting
//! happens on a per-cycle `watch` channel captured under the lock, which is
//! what keeps cycle A's outcome away from cycle B's waiters.
//!
//! If the leader's future is dropped before completing, its guard removes
//! the entry and drops the sender; waiters then resolve to
//! [`Error::Abandoned`].

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

type Outcome<T> = Option<Result<T>>;

/// Handle a waiter holds on an open cycle.
pub struct Waiter<T> {
    id: Uuid,
    receiver: watch::Receiver<Outcome<T>>,
}

impl<T> Clone for Waiter<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            receiver: self.receiver.clone(),
        }
    }
}

impl<T: Clone> Waiter<T> {
    pub fn cycle_id(&self) -> Uuid {
        self.id
    }

    /// Wait for this cycle's outcome.
    pub async fn wait(mut self) -> Result<T> {
        match self.receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(Error::Abandoned)),
            Err(_) => Err(Error::Abandoned),
        }
    }
}

/// The one caller allowed to produce a cycle's outcome.
pub struct Leader<'a, K: Eq + Hash, T> {
    flight: &'a Flight<K, T>,
    key: Option<K>,
    id: Uuid,
    sender: Option<watch::Sender<Outcome<T>>>,
}

impl<K: Eq + Hash, T> Leader<'_, K, T> {
    pub fn cycle_id(&self) -> Uuid {
        self.id
    }

    /// Publish the outcome and close the cycle.
    ///
    /// Removal and signalling happen in one critical section: any caller
    /// that can still see the entry is guaranteed to get this outcome.
    pub fn complete(mut self, outcome: Result<T>) {
        let flight = self.flight;
        let mut cycles = flight.cycles.lock();
        self.release(&mut cycles);
        if let Some(sender) = self.sender.take() {
            sender.send_replace(Some(outcome));
        }
    }

    fn release(&mut self, cycles: &mut HashMap<K, Waiter<T>>) {
        if let Some(key) = self.key.take() {
            if cycles.get(&key).is_some_and(|w| w.id == self.id) {
                cycles.remove(&key);
            }
        }
    }
}

impl<K: Eq + Hash, T> Drop for Leader<'_, K, T> {
    fn drop(&mut self) {
        if self.key.is_some() {
            debug!(cycle_id = %self.id, "cycle leader dropped before completing");
            let flight = self.flight;
            let mut cycles = flight.cycles.lock();
            self.release(&mut cycles);
        }
    }
}

/// Result of joining a key.
pub enum Join<'a, K: Eq + Hash, T> {
    Leader(Leader<'a, K, T>),
    Waiter(Waiter<T>),
}

/// Outcome of [`Flight::run`] together with how the caller took part.
#[derive(Debug, Clone)]
pub struct Shared<T> {
    /// Whether this caller executed the work
    pub led: bool,
    pub cycle_id: Uuid,
    pub outcome: Result<T>,
}

/// Map of open cycles.
pub struct Flight<K, T> {
    cycles: Mutex<HashMap<K, Waiter<T>>>,
}

impl<K: Eq + Hash, T> Default for Flight<K, T> {
    fn default() -> Self {
        Self {
            cycles: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, T: Clone> Flight<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the open cycle for `key`, or open one and lead it.
    pub fn join(&self, key: K) -> Join<'_, K, T> {
        let mut cycles = self.cycles.lock();
        if let Some(waiter) = cycles.get(&key) {
            return Join::Waiter(waiter.clone());
        }
        let id = Uuid::new_v4();
        let (sender, receiver) = watch::channel(None);
        cycles.insert(key.clone(), Waiter { id, receiver });
        Join::Leader(Leader {
            flight: self,
            key: Some(key),
            id,
            sender: Some(sender),
        })
    }

    /// Run `work` as the leader of a new cycle, or share the open cycle's
    /// outcome. `work` is only polled when this caller leads.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Shared<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.join(key) {
            Join::Waiter(waiter) => {
                let cycle_id = waiter.cycle_id();
                Shared {
                    led: false,
                    cycle_id,
                    outcome: waiter.wait().await,
                }
            }
            Join::Leader(leader) => {
                let cycle_id = leader.cycle_id();
                let outcome = work().await;
                leader.complete(outcome.clone());
                Shared {
                    led: true,
                    cycle_id,
                    outcome,
                }
            }
        }
    }

    /// Number of open cycles.
    pub fn in_flight(&self) -> usize {
        self.cycles.lock().len()
    }
}
