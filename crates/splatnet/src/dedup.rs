//! Request deduplication
//!
//! Identical outbound calls issued while one is already in flight share its
//! outcome instead of hitting the network again. Calls are identical when
//! their [`RequestKey`]s are equal.

use std::fmt;
use std::future::Future;

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::flight::Flight;
use crate::metrics;

/// Operation name, canonical arguments and attempt number.
///
/// The attempt number keeps a post-refresh retry from joining a cycle that
/// was started with the old token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    operation: String,
    arguments: String,
    attempt: u8,
}

impl RequestKey {
    pub fn new(operation: impl Into<String>, arguments: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(arguments, &mut canonical);
        Self {
            operation: operation.into(),
            arguments: canonical,
            attempt: 0,
        }
    }

    /// Key for the next attempt of the same call.
    pub fn retry(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.clone()
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn attempt(&self) -> u8 {
        self.attempt
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})#{}", self.operation, self.arguments, self.attempt)
    }
}

/// JSON with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Single-flights outbound calls by key.
pub struct RequestCoordinator<T> {
    cycles: Flight<RequestKey, T>,
}

impl<T: Clone> Default for RequestCoordinator<T> {
    fn default() -> Self {
        Self {
            cycles: Flight::new(),
        }
    }
}

impl<T: Clone> RequestCoordinator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `call` unless an identical call is in flight, in which case wait
    /// for that one's outcome. Errors are shared the same way as successes.
    pub async fn run<F, Fut>(&self, key: RequestKey, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let label = key.to_string();
        let operation = key.operation.clone();
        let shared = self.cycles.run(key, call).await;
        metrics::record_request(&operation, !shared.led);
        debug!(
            request = %label,
            cycle_id = %shared.cycle_id,
            shared = !shared.led,
            ok = shared.outcome.is_ok(),
            "request cycle finished"
        );
        shared.outcome
    }

    /// Number of distinct calls in flight.
    pub fn in_flight(&self) -> usize {
        self.cycles.in_flight()
    }
}
