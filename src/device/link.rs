//! Byte transport under a serial session.
//!
//! [`SerialLink`] is the seam between the session and the OS serial port, so
//! the daemon can also run against the in-memory [`SimulatedPanel`].
//!
//! [`SimulatedPanel`]: crate::device::sim::SimulatedPanel

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};

use crate::error::{NeewerError, Result};

/// Bidirectional byte link to a panel.
pub trait SerialLink: Read + Write + Send {
    /// Discard anything queued in either direction.
    fn clear_buffers(&mut self) -> io::Result<()>;

    /// Bound the next blocking read.
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Independent handle to the same link, used for reading while another
    /// handle writes.
    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn clear_buffers(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::All).map_err(io::Error::from)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_timeout(timeout).map_err(io::Error::from)
    }

    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>> {
        let clone = self.try_clone().map_err(io::Error::from)?;
        Ok(Box::new(clone))
    }
}

/// Open an OS serial port.
pub fn open_port(port: &str, baud_rate: u32, timeout: Duration) -> Result<Box<dyn SerialLink>> {
    let handle = serialport::new(port, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| NeewerError::device(port, e))?;
    Ok(Box::new(handle))
}

/// List serial ports visible to the OS.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(|e| NeewerError::device("*", e))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
