//! Nintendo Switch Online authentication library
//!
//! Provides the PKCE login flow, the f-token oracle client, the credential
//! exchange chain that turns a session token into SplatNet tokens, and
//! bundle file storage. It has no dependency on the SplatNet client or the
//! CLI and can be tested on its own.
//!
//! Credential flow:
//! 1. `NsoAuth::begin_login()` builds the authorize URL and PKCE verifier
//! 2. The user logs in and copies the `npf71b963c1b7b6d119://` redirect
//! 3. `NsoAuth::complete_login()` exchanges it for a session token and
//!    derives a full `Bundle`
//! 4. The bundle is saved via `store::BundleStore::put()`
//! 5. On expiry, `NsoAuth::derive_bundle()` re-runs the chain from the
//!    stored session token

pub mod bundle;
pub mod constants;
pub mod endpoints;
pub mod error;
pub mod exchange;
pub mod oracle;
pub mod pkce;
pub mod store;
pub mod versions;

#[cfg(test)]
pub(crate) mod testing;

pub use bundle::Bundle;
pub use endpoints::Endpoints;
pub use error::{Error, IssuanceFailure, Result};
pub use exchange::{LoginRequest, NsoAuth, Stage};
pub use oracle::OracleClient;
pub use store::{BundleStore, StoredAccount};
pub use versions::{VersionCache, VersionOverrides};
