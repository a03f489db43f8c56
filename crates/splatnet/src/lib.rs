//! SplatNet 3 client with coordinated token refresh
//!
//! [`SplatNet`] wraps the persisted-query GraphQL API and the NSO app API for
//! one account. Tokens come from a [`nso_auth::Bundle`]; when SplatNet answers
//! 401 the bundle is re-derived from its session token and the request is
//! retried once.
//!
//! Concurrency guarantees:
//! - at most one refresh runs per client, callers arriving mid-refresh share
//!   its outcome ([`RefreshCoordinator`])
//! - identical in-flight requests share one network call
//!   ([`RequestCoordinator`])
//! - a cancelled leader releases its waiters with [`Error::Abandoned`]
//!
//! Hosts persist refreshed bundles through a [`TokenSink`] and learn about
//! dead sessions through a [`SessionExpiryHandler`].

pub mod api;
pub mod dedup;
pub mod error;
pub mod flight;
pub mod graphql;
pub mod metrics;
pub mod ports;
pub mod refresh;

#[cfg(test)]
mod testing;

pub use api::{DEFAULT_X_RANKING_REGION, SplatNet};
pub use dedup::{RequestCoordinator, RequestKey};
pub use error::{Error, Result};
pub use flight::{Flight, Shared};
pub use ports::{PortError, PortFuture, SessionExpiryHandler, TokenSink};
pub use refresh::{Attempt, BundleSource, RefreshCoordinator};
