/// Errors produced while building a policy or talking to the store.
///
/// A rejected request is not an error: strategies report it as
/// `ControlFlow::Break(Reason)`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A policy was configured with a value its algorithm cannot work with.
    ///
    /// Raised synchronously by constructors, so an invalid policy never exists.
    #[error("invalid {field}: {reason}")]
    InvalidConfig {
        /// The offending parameter.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The store could not be reached, or the procedure failed while running.
    ///
    /// The core never retries and never fails open: the caller decides.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store no longer knows the procedure, e.g. after a restart or
    /// `SCRIPT FLUSH`. The policy registers it again on its next call.
    #[error("store lost the procedure: {0}")]
    NoScript(String),

    /// The store answered with a value the procedure never returns.
    #[error("procedure `{procedure}` returned an unexpected reply: {reply}")]
    UnexpectedReply {
        procedure: &'static str,
        reply: String,
    },
}

impl Error {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// `true` for failures of the shared store rather than of configuration.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::NoScript(_) | Self::UnexpectedReply { .. }
        )
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::NoScriptError => Self::NoScript(err.to_string()),
            _ => Self::StoreUnavailable(err.to_string()),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_field() {
        let err = Error::invalid("window", "must be positive");
        assert_eq!(err.to_string(), "invalid window: must be positive");
        assert!(!err.is_store_failure());
    }

    #[test]
    fn store_errors_are_flagged() {
        assert!(Error::StoreUnavailable("connection refused".into()).is_store_failure());
        assert!(Error::NoScript("NOSCRIPT".into()).is_store_failure());
        assert!(
            Error::UnexpectedReply {
                procedure: "gcra",
                reply: "[1]".into()
            }
            .is_store_failure()
        );
    }
}
