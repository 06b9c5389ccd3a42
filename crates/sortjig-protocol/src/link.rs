//! Serial link abstraction and the real UART implementation.

use crate::error::{ProtocolError, ProtocolResult};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Read;
use std::time::Duration;
use tracing::{debug, info};

/// Byte-level serial transport to the jig firmware.
///
/// Implementations must make `read_byte` return within roughly the given
/// timeout so the engine can poll for shutdown; `Ok(None)` means the
/// timeout elapsed with nothing received and is not an error.
pub trait SerialLink: Send {
    /// Read one byte, waiting at most `timeout`.
    async fn read_byte(&mut self, timeout: Duration) -> ProtocolResult<Option<u8>>;

    /// Write one byte.
    async fn write_byte(&mut self, byte: u8) -> ProtocolResult<()>;

    /// Flush buffered output to the wire.
    async fn flush(&mut self) -> ProtocolResult<()>;

    /// Close and reopen the underlying port after an I/O failure.
    async fn reopen(&mut self) -> ProtocolResult<()>;
}

/// Real UART link (8N1, no flow control).
pub struct UartLink {
    port: Box<dyn SerialPort>,
    port_name: String,
    baud_rate: u32,
}

impl UartLink {
    /// Open the serial device.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Link`] if the device cannot be opened or
    /// configured.
    pub fn open(port_name: &str, baud_rate: u32) -> ProtocolResult<Self> {
        let port = Self::open_port(port_name, baud_rate)?;
        info!(port = port_name, baud = baud_rate, "serial port opened");
        Ok(Self {
            port,
            port_name: port_name.to_string(),
            baud_rate,
        })
    }

    fn open_port(port_name: &str, baud_rate: u32) -> ProtocolResult<Box<dyn SerialPort>> {
        serialport::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| ProtocolError::Link(format!("cannot open {}: {}", port_name, e)))
    }
}

impl SerialLink for UartLink {
    async fn read_byte(&mut self, timeout: Duration) -> ProtocolResult<Option<u8>> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| ProtocolError::Link(e.to_string()))?;

        // serialport reads are blocking; keep them off the async executor.
        tokio::task::block_in_place(|| {
            let mut buf = [0u8; 1];
            match self.port.read(&mut buf) {
                Ok(0) => Ok(None),
                Ok(_) => {
                    debug!(byte = buf[0], "rx");
                    Ok(Some(buf[0]))
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
                Err(e) => Err(ProtocolError::Link(e.to_string())),
            }
        })
    }

    async fn write_byte(&mut self, byte: u8) -> ProtocolResult<()> {
        tokio::task::block_in_place(|| {
            self.port
                .write_all(&[byte])
                .map_err(|e| ProtocolError::Link(e.to_string()))
        })?;
        debug!(byte, "tx");
        Ok(())
    }

    async fn flush(&mut self) -> ProtocolResult<()> {
        tokio::task::block_in_place(|| {
            self.port
                .flush()
                .map_err(|e| ProtocolError::Link(e.to_string()))
        })
    }

    async fn reopen(&mut self) -> ProtocolResult<()> {
        self.port = Self::open_port(&self.port_name, self.baud_rate)?;
        info!(port = %self.port_name, "serial port reopened");
        Ok(())
    }
}
