//! Configuration errors shared by the libraries and the CLI

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A setting parsed but failed validation
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key,
            reason: reason.into(),
        }
    }

    /// Name of the offending setting, if validation failed.
    pub fn setting(&self) -> Option<&'static str> {
        match self {
            Self::InvalidSetting { key, .. } => Some(key),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_setting_names_the_key() {
        let err = Error::invalid("store.path", "must not be empty");
        assert_eq!(err.to_string(), "invalid setting store.path: must not be empty");
        assert_eq!(err.setting(), Some("store.path"));
    }

    #[test]
    fn io_errors_have_no_setting() {
        let err = Error::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "splatnet.toml",
        ));
        assert!(err.to_string().starts_with("I/O error:"), "got: {err}");
        assert_eq!(err.setting(), None);
    }

    #[test]
    fn toml_errors_convert_with_question_mark() {
        fn parse(raw: &str) -> Result<toml::Table> {
            Ok(toml::from_str(raw)?)
        }
        let err = parse("[store\npath = 1").unwrap_err();
        assert!(matches!(err, Error::Toml(_)), "got: {err:?}");
    }
}
