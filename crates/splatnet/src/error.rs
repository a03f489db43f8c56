//! Error types for SplatNet operations

/// Errors from the coordinators and the API facade.
///
/// `Clone` so one cycle's outcome can be handed to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Classified credential failure, passed through from the exchange
    #[error(transparent)]
    Auth(#[from] nso_auth::Error),

    /// Any other exchange failure during a refresh
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("no session token available, cannot refresh")]
    NoSession,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unknown persisted query: {0}")]
    UnknownQuery(String),

    /// The cycle's leader went away before publishing an outcome.
    #[error("in-flight call abandoned before completing")]
    Abandoned,
}

impl Error {
    /// Wrap a refresh failure. Classified kinds keep their identity; the
    /// rest become [`Error::RefreshFailed`].
    pub fn from_refresh(error: nso_auth::Error) -> Self {
        match error {
            nso_auth::Error::SessionExpired
            | nso_auth::Error::MembershipRequired { .. }
            | nso_auth::Error::IssuanceRejected { .. } => Error::Auth(error),
            other => Error::RefreshFailed(other.to_string()),
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::Auth(e) if e.is_session_expired())
    }

    /// Session expired or membership lapsed: only the user can fix it.
    pub fn requires_relogin(&self) -> bool {
        matches!(self, Error::Auth(e) if e.requires_relogin())
    }

    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Error::Auth(nso_auth::Error::SessionExpired) => "session_expired",
            Error::Auth(nso_auth::Error::MembershipRequired { .. }) => "membership_required",
            Error::Auth(nso_auth::Error::IssuanceRejected { .. }) => "issuance_rejected",
            Error::Auth(_) => "auth",
            Error::RefreshFailed(_) => "refresh_failed",
            Error::NoSession => "no_session",
            Error::Transport(_) => "transport",
            Error::UnknownQuery(_) => "unknown_query",
            Error::Abandoned => "abandoned",
        }
    }
}

/// Result alias for SplatNet operations.
pub type Result<T> = std::result::Result<T, Error>;
