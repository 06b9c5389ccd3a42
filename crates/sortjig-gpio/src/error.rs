use thiserror::Error;

/// GPIO failures.
///
/// Any of these is fatal for the handshake: a line the host cannot drive
/// means the firmware either never sees ready or never sees a pulse, and
/// the mechanism stalls either way.
#[derive(Error, Debug)]
pub enum GpioError {
    #[error("Failed to export GPIO {pin}: {message}")]
    Export { pin: u32, message: String },

    #[error("Failed to configure GPIO {pin}: {message}")]
    Configure { pin: u32, message: String },

    #[error("Failed to write GPIO {pin}: {message}")]
    Write { pin: u32, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<GpioError> for sortjig_core::Error {
    fn from(err: GpioError) -> Self {
        sortjig_core::Error::Gpio(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GpioError>;
