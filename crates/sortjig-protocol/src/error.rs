use thiserror::Error;

/// Protocol and serial link failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A single serial operation failed; the engine will try to reopen.
    #[error("Serial I/O error: {0}")]
    Link(String),

    /// Reopening the port failed repeatedly; the engine stops.
    #[error("Serial link lost after {attempts} reopen attempts: {message}")]
    LinkExhausted { attempts: u32, message: String },

    /// The scan coordinator side of the pipeline is gone.
    #[error("Scan pipeline closed")]
    PipelineClosed,

    /// Driving the ready/busy line failed.
    #[error(transparent)]
    Gpio(#[from] sortjig_gpio::GpioError),
}

impl From<ProtocolError> for sortjig_core::Error {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Link(msg) => sortjig_core::Error::SerialLink(msg),
            ProtocolError::LinkExhausted { attempts, message } => {
                sortjig_core::Error::SerialLinkExhausted { attempts, message }
            }
            ProtocolError::PipelineClosed => {
                sortjig_core::Error::ChannelClosed("scan pipeline")
            }
            ProtocolError::Gpio(e) => sortjig_core::Error::Gpio(e.to_string()),
        }
    }
}

/// Specialized result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
