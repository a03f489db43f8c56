//! Single-flight token refresh
//!
//! Any number of callers may ask for a refresh at once; one exchange runs
//! and every caller that joined while it was open gets its bundle or its
//! classified error. A caller arriving after the cycle closed starts a new
//! exchange. The refresh re-derives the API tokens from the session token;
//! it never repeats the browser login.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use common::Secret;
use nso_auth::{Bundle, NsoAuth};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::flight::{Flight, Shared};
use crate::metrics;

/// Produces a fresh bundle from a session token.
///
/// Implemented for [`NsoAuth`]; tests and hosts may supply their own.
pub trait BundleSource: Send + Sync {
    fn derive<'a>(
        &'a self,
        session_token: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = nso_auth::Result<Bundle>> + Send + 'a>>;
}

impl BundleSource for NsoAuth {
    fn derive<'a>(
        &'a self,
        session_token: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = nso_auth::Result<Bundle>> + Send + 'a>> {
        Box::pin(self.derive_bundle(session_token))
    }
}

/// One caller's view of a refresh cycle.
pub type Attempt = Shared<Bundle>;

/// Owns the live bundle and serialises refreshes of it.
pub struct RefreshCoordinator {
    source: Arc<dyn BundleSource>,
    cycles: Flight<(), Bundle>,
    live: RwLock<Bundle>,
}

impl RefreshCoordinator {
    pub fn new(source: Arc<dyn BundleSource>, bundle: Bundle) -> Self {
        Self {
            source,
            cycles: Flight::new(),
            live: RwLock::new(bundle),
        }
    }

    /// Snapshot of the live bundle.
    pub fn current(&self) -> Bundle {
        self.live.read().clone()
    }

    pub fn in_progress(&self) -> bool {
        self.cycles.in_flight() > 0
    }

    /// Refresh, reporting whether this caller led the cycle.
    ///
    /// The leader stores a successful bundle as the live one before any
    /// waiter is released.
    pub async fn attempt(&self, session_token: &Secret<String>) -> Attempt {
        let attempt = self
            .cycles
            .run((), || async {
                info!("refresh cycle started");
                let outcome = self
                    .source
                    .derive(session_token)
                    .await
                    .map_err(Error::from_refresh);
                match &outcome {
                    Ok(bundle) => {
                        *self.live.write() = bundle.clone();
                        metrics::record_refresh("success");
                        info!(nickname = %bundle.user_nickname, "refresh cycle succeeded");
                    }
                    Err(e) => {
                        metrics::record_refresh(e.label());
                        warn!(error = %e, outcome = e.label(), "refresh cycle failed");
                    }
                }
                outcome
            })
            .await;

        if attempt.led {
            debug!(cycle_id = %attempt.cycle_id, "refresh cycle closed");
        } else {
            debug!(
                cycle_id = %attempt.cycle_id,
                ok = attempt.outcome.is_ok(),
                "joined in-flight refresh"
            );
        }
        attempt
    }

    pub async fn refresh(&self, session_token: &Secret<String>) -> Result<Bundle> {
        self.attempt(session_token).await.outcome
    }
}
