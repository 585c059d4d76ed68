//! State mirror: keeps the in-memory light state in sync with the panel.
//!
//! The panel reports its state as ordinary 8-byte frames. A background
//! thread reads them, applies each one to [`SharedState`], and fires the
//! [`ReadyLatch`] once the first report has arrived.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::device::{ReadOutcome, Session};
use crate::error::{NeewerError, Result};
use crate::protocol::{
    DeviceState, FRAME_HEADER, FRAME_LEN, Frame, FrameFields, decode_frame, hex,
};

// =============================================================================
// Constants
// =============================================================================

/// Upper bound on one blocking serial read.
pub const MIRROR_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause after a hard read error before trying again.
pub const MIRROR_ERROR_BACKOFF: Duration = Duration::from_millis(250);

// =============================================================================
// Shared State
// =============================================================================

/// Light state shared between the mirror and connection handlers.
///
/// Locks are held only for copying or updating the fields, never across I/O.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<DeviceState>>,
}

impl SharedState {
    pub fn new(initial: DeviceState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> DeviceState {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply a decoded device report.
    pub fn apply(&self, fields: FrameFields) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(fields);
    }
}

// =============================================================================
// Ready Latch
// =============================================================================

/// One-shot signal: set once, never reset.
#[derive(Debug, Clone, Default)]
pub struct ReadyLatch {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ReadyLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the latch. Returns `true` only for the call that opened it.
    pub fn fire(&self) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut ready = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if *ready {
            return false;
        }
        *ready = true;
        cvar.notify_all();
        true
    }

    pub fn is_ready(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the latch fires.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut ready = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*ready {
            ready = cvar.wait(ready).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block for at most `timeout`. Returns whether the latch has fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let ready = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (ready, _) = cvar
            .wait_timeout_while(ready, timeout, |ready| !*ready)
            .unwrap_or_else(PoisonError::into_inner);
        *ready
    }
}

// =============================================================================
// Frame Assembly
// =============================================================================

/// Reassembles a serial byte stream into frames.
///
/// Bytes before a frame header are discarded, so the assembler resyncs after
/// line noise or a partial frame.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete header-aligned frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Frame> {
        match self.header_offset() {
            Some(0) => {}
            Some(skip) => {
                trace!(skipped = skip, "Discarding bytes before frame header");
                self.buf.drain(..skip);
            }
            None => {
                // Keep a possible header prefix at the tail.
                let keep = self.partial_header_len();
                let drop = self.buf.len() - keep;
                self.buf.drain(..drop);
                return None;
            }
        }

        if self.buf.len() < FRAME_LEN {
            return None;
        }

        let mut frame = [0u8; FRAME_LEN];
        frame.copy_from_slice(&self.buf[..FRAME_LEN]);
        self.buf.drain(..FRAME_LEN);
        Some(frame)
    }

    /// Bytes currently held.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn header_offset(&self) -> Option<usize> {
        self.buf
            .windows(FRAME_HEADER.len())
            .position(|w| w == FRAME_HEADER)
    }

    fn partial_header_len(&self) -> usize {
        (1..FRAME_HEADER.len())
            .rev()
            .find(|&n| n <= self.buf.len() && self.buf[self.buf.len() - n..] == FRAME_HEADER[..n])
            .unwrap_or(0)
    }
}

// =============================================================================
// Mirror Loop
// =============================================================================

/// Background reader for device reports.
pub struct StateMirror;

impl StateMirror {
    /// Start the mirror thread.
    ///
    /// The loop runs until `running` is cleared. Read errors are logged and
    /// retried; they never stop the thread.
    ///
    /// # Errors
    /// Returns `Io` if the thread cannot be spawned.
    pub fn spawn(
        session: Arc<Session>,
        state: SharedState,
        ready: ReadyLatch,
        running: Arc<AtomicBool>,
    ) -> Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("state-mirror".into())
            .spawn(move || run_mirror(&session, &state, &ready, &running))
            .map_err(NeewerError::Io)
    }
}

fn run_mirror(session: &Session, state: &SharedState, ready: &ReadyLatch, running: &AtomicBool) {
    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; 64];

    debug!(port = %session.port(), "State mirror started");

    while running.load(Ordering::SeqCst) {
        match session.read_into(&mut buf, MIRROR_READ_TIMEOUT) {
            Ok(ReadOutcome::Data(n)) => {
                assembler.push(&buf[..n]);
                while let Some(frame) = assembler.next_frame() {
                    apply_report(&frame, state, ready);
                }
            }
            Ok(ReadOutcome::TimedOut) => {
                trace!("No device report within read timeout");
            }
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                warn!(error = %e, "Device read failed, retrying");
                std::thread::sleep(MIRROR_ERROR_BACKOFF);
            }
        }
    }

    debug!("State mirror stopped");
}

fn apply_report(frame: &Frame, state: &SharedState, ready: &ReadyLatch) {
    match decode_frame(frame) {
        Ok(fields) => {
            state.apply(fields);
            trace!(frame = %hex(frame), "Applied device report");
            if ready.fire() {
                info!(
                    power = fields.power,
                    brightness = fields.brightness,
                    temperature = fields.kelvin(),
                    "Received first device report"
                );
            }
        }
        Err(e) => {
            debug!(frame = %hex(frame), error = %e, "Ignoring undecodable report");
        }
    }
}
