use thiserror::Error;

/// Workspace-wide error taxonomy.
///
/// Validation outcomes (format errors, duplicates) are *not* errors: they
/// are [`crate::ClassificationKind`] variants and never propagate as `Err`.
/// This enum covers the transport and infrastructure failures:
///
/// - `Storage`: ledger I/O or constraint failure. Recoverable at the scan
///   level (the engine answers scanner-error) but logged for operator
///   attention; never silently retried, since a retry risks double-counting.
/// - `SerialLink`: transient UART failure. Retried with bounded backoff;
///   exhausting the retries is fatal and stops the engine.
/// - `Gpio`: ready/busy line failure. Fatal: a half-driven line stalls the
///   plate mechanism.
/// - `Configuration`: missing reference lists, bad config file, bad ledger
///   target. Fatal at startup; the engine never reaches listening.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serial link error: {0}")]
    SerialLink(String),

    #[error("Serial link failed after {attempts} reopen attempts: {message}")]
    SerialLinkExhausted { attempts: u32, message: String },

    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Pipeline channel closed: {0}")]
    ChannelClosed(&'static str),
}

impl Error {
    /// Whether this error must stop the engine rather than the single
    /// in-flight scan.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::SerialLinkExhausted { .. }
                | Error::Gpio(_)
                | Error::Configuration(_)
                | Error::ChannelClosed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_recoverable() {
        assert!(!Error::Storage("disk full".into()).is_fatal());
        assert!(!Error::SerialLink("EIO".into()).is_fatal());
    }

    #[test]
    fn exhausted_link_is_fatal() {
        let err = Error::SerialLinkExhausted {
            attempts: 3,
            message: "no such device".into(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("3 reopen attempts"));
    }
}
