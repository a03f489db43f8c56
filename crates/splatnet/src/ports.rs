//! Host callbacks consumed by the API facade
//!
//! Both ports are fire-and-continue: a failure is logged by the caller and
//! never changes the outcome of the refresh that triggered it. Methods return
//! boxed futures so `Arc<dyn TokenSink>` works and hosts can implement them
//! with or without awaiting anything.

use std::future::Future;
use std::pin::Pin;

use nso_auth::Bundle;

use crate::error::Error;

/// Error a host reports from a callback.
pub type PortError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future returned by port methods.
pub type PortFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<(), PortError>> + Send + 'a>>;

/// Receives every bundle produced by a successful refresh.
pub trait TokenSink: Send + Sync {
    fn tokens_updated<'a>(&'a self, bundle: &'a Bundle) -> PortFuture<'a>;
}

/// Told when a refresh found the session dead or the membership lapsed.
pub trait SessionExpiryHandler: Send + Sync {
    fn session_expired<'a>(&'a self, error: &'a Error) -> PortFuture<'a>;
}
