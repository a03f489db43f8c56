//! Common types shared by the NSO authentication and SplatNet crates

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
