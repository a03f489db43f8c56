//! Error types for NSO authentication operations
//!
//! Every variant carries owned strings so one error value can be handed to
//! all waiters of a shared refresh.

use crate::exchange::Stage;

/// Bullet token issuance rejections, keyed by the status SplatNet answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceFailure {
    /// 401: the game web token was not accepted
    InvalidGameToken,
    /// 403: the app or web view version is too old
    OutdatedClient,
    /// 204: the account never opened SplatNet 3
    NotRegistered,
    /// 499: the account is banned
    Banned,
}

impl IssuanceFailure {
    /// Classify a bullet token response status. `None` for anything else.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 => Some(Self::InvalidGameToken),
            403 => Some(Self::OutdatedClient),
            204 => Some(Self::NotRegistered),
            499 => Some(Self::Banned),
            _ => None,
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidGameToken => 401,
            Self::OutdatedClient => 403,
            Self::NotRegistered => 204,
            Self::Banned => 499,
        }
    }

    /// Message suitable for showing to the account owner.
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidGameToken => "game web token rejected, log in again",
            Self::OutdatedClient => "client version outdated, update the app version",
            Self::NotRegistered => "account has not been set up on SplatNet 3",
            Self::Banned => "account is banned from SplatNet 3",
        }
    }
}

impl std::fmt::Display for IssuanceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Errors from NSO authentication operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("session token expired or revoked, log in again")]
    SessionExpired,

    #[error("Nintendo Switch Online membership required for {nickname}")]
    MembershipRequired { nickname: String },

    #[error("bullet token rejected ({status}) for {nickname}: {reason}")]
    IssuanceRejected {
        status: u16,
        reason: IssuanceFailure,
        nickname: String,
    },

    #[error("{stage} exchange failed: {message}")]
    Exchange { stage: Stage, message: String },

    #[error("oracle returned no encrypted payload during {stage} exchange")]
    MissingEncryptedPayload { stage: Stage },

    #[error("invalid login callback: {0}")]
    InvalidCallback(String),

    #[error("oracle {operation} returned {status}: {body}")]
    OracleStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("could not parse oracle {operation} response: {message}")]
    OracleParse {
        operation: &'static str,
        message: String,
    },

    #[error("oracle {operation} reported an error: {detail}")]
    OracleRejected {
        operation: &'static str,
        detail: String,
    },

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// The root session token is no longer usable.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::SessionExpired)
    }

    /// Refreshing cannot succeed until the account owner acts (log in again
    /// or renew the membership).
    pub fn requires_relogin(&self) -> bool {
        matches!(
            self,
            Error::SessionExpired | Error::MembershipRequired { .. }
        )
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Trim a response body for inclusion in an error message.
pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issuance_statuses_roundtrip() {
        for status in [401, 403, 204, 499] {
            let failure = IssuanceFailure::from_status(status).unwrap();
            assert_eq!(failure.status(), status);
        }
        assert_eq!(IssuanceFailure::from_status(500), None);
        assert_eq!(IssuanceFailure::from_status(200), None);
    }

    #[test]
    fn rejection_display_carries_status_and_nickname() {
        let err = Error::IssuanceRejected {
            status: 499,
            reason: IssuanceFailure::Banned,
            nickname: "Inkling".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("499"), "got: {msg}");
        assert!(msg.contains("Inkling"), "got: {msg}");
        assert!(msg.contains("banned"), "got: {msg}");
    }

    #[test]
    fn relogin_classification() {
        assert!(Error::SessionExpired.requires_relogin());
        assert!(
            Error::MembershipRequired {
                nickname: "x".into()
            }
            .requires_relogin()
        );
        assert!(!Error::Http("timeout".into()).requires_relogin());
        assert!(!Error::Http("timeout".into()).is_session_expired());
    }

    #[test]
    fn excerpt_truncates_long_bodies() {
        let body = "x".repeat(1000);
        assert_eq!(excerpt(&body).len(), 200);
        assert_eq!(excerpt("short"), "short");
    }
}
