//! Serial session owning the panel connection.
//!
//! High-level interface for waking the panel, writing paced frames and
//! reading its reports.

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::SerialSettings;
use crate::device::link::{SerialLink, open_port};
use crate::error::{NeewerError, Result};
use crate::protocol::{Frame, WAKE_PROBE, hex};

/// Result of a bounded read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer.
    Data(usize),
    /// Nothing arrived before the timeout. Not an error.
    TimedOut,
}

/// Exclusive owner of one panel's serial link.
///
/// Reads and writes go through separate handles, so the mirror blocking in
/// [`read_into`](Self::read_into) never delays a [`write`](Self::write).
///
/// # Example
///
/// ```no_run
/// use neewerctl::config::SerialSettings;
/// use neewerctl::device::Session;
/// use neewerctl::protocol::encode_frame;
///
/// let session = Session::open("/dev/ttyUSB0", &SerialSettings::default())?;
/// session.write(&encode_frame(true, 80, 4500))?;
/// session.close();
/// # Ok::<(), neewerctl::error::NeewerError>(())
/// ```
pub struct Session {
    port: String,
    settings: SerialSettings,
    writer: Mutex<Option<Box<dyn SerialLink>>>,
    reader: Mutex<Option<Box<dyn SerialLink>>>,
}

impl Session {
    /// Open an OS serial port and wake the panel.
    ///
    /// # Errors
    /// Returns `DeviceUnavailable` if the port cannot be opened or the wake
    /// sequence fails.
    pub fn open(port: &str, settings: &SerialSettings) -> Result<Self> {
        let link = open_port(port, settings.baud_rate, settings.read_timeout)?;
        Self::from_link(port, link, settings)
    }

    /// Wake the panel over an already-open link.
    ///
    /// Clears both buffers, writes the 4-byte zero probe and waits the settle
    /// interval before returning.
    pub fn from_link(
        port: &str,
        mut link: Box<dyn SerialLink>,
        settings: &SerialSettings,
    ) -> Result<Self> {
        link.clear_buffers()
            .map_err(|e| NeewerError::device(port, format!("failed to clear buffers: {}", e)))?;
        link.write_all(&WAKE_PROBE)
            .and_then(|_| link.flush())
            .map_err(|e| NeewerError::device(port, format!("wake probe failed: {}", e)))?;
        std::thread::sleep(settings.settle);

        let reader = link
            .try_clone_link()
            .map_err(|e| NeewerError::device(port, format!("failed to clone handle: {}", e)))?;

        info!(port = %port, baud = settings.baud_rate, "Serial session open");

        Ok(Self {
            port: port.to_string(),
            settings: settings.clone(),
            writer: Mutex::new(Some(link)),
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Port this session was opened on.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Write one frame.
    ///
    /// Sleeps the pacing interval before transmitting. The sleep happens while
    /// holding the writer lock, so concurrent callers are spaced out too.
    ///
    /// # Errors
    /// Returns `DeviceUnavailable` if the session is closed or the write fails.
    pub fn write(&self, frame: &Frame) -> Result<()> {
        let mut guard = lock(&self.writer);
        let link = guard.as_mut().ok_or_else(|| self.closed())?;

        std::thread::sleep(self.settings.write_pacing);
        link.write_all(frame)
            .and_then(|_| link.flush())
            .map_err(|e| NeewerError::device(&self.port, e))?;

        debug!(frame = %hex(frame), "Frame written");
        Ok(())
    }

    /// Blocking read bounded by `timeout`.
    ///
    /// A timeout is reported as [`ReadOutcome::TimedOut`] so callers can poll
    /// in a loop.
    ///
    /// # Errors
    /// Returns `DeviceUnavailable` on a hard I/O error or a closed session.
    pub fn read_into(&self, buf: &mut [u8], timeout: Duration) -> Result<ReadOutcome> {
        let mut guard = lock(&self.reader);
        let link = guard.as_mut().ok_or_else(|| self.closed())?;

        link.set_read_timeout(timeout)
            .map_err(|e| NeewerError::device(&self.port, e))?;

        match link.read(buf) {
            Ok(0) => Ok(ReadOutcome::TimedOut),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(ReadOutcome::TimedOut)
            }
            Err(e) => Err(NeewerError::device(&self.port, e)),
        }
    }

    /// Release the port. Safe to call more than once.
    pub fn close(&self) {
        let writer = lock(&self.writer).take();
        let reader = lock(&self.reader).take();
        if writer.is_some() || reader.is_some() {
            info!(port = %self.port, "Serial session closed");
        }
    }

    pub fn is_open(&self) -> bool {
        lock(&self.writer).is_some()
    }

    fn closed(&self) -> NeewerError {
        NeewerError::device(&self.port, "session closed")
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("port", &self.port)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
