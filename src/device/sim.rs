//! In-memory panel for running the daemon without hardware.
//!
//! Behaves like a panel that echoes every accepted frame back as a status
//! report. Used by `neewerctl daemon run --simulate` and the test suites.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::device::link::SerialLink;
use crate::protocol::{DeviceState, FRAME_HEADER, FRAME_LEN, Frame, SYNC, WAKE_PROBE};

/// Received frames kept for inspection; older ones are discarded.
pub const WRITE_HISTORY: usize = 256;

#[derive(Debug)]
struct PanelState {
    current: DeviceState,
    /// Bytes waiting for the host to read.
    outbound: VecDeque<u8>,
    /// Partial frame written by the host.
    inbound: Vec<u8>,
    zero_run: usize,
    written: VecDeque<(Frame, Instant)>,
    wake_probes: usize,
    announce_on_wake: bool,
    echo: bool,
    fail_writes: bool,
    failing_reads: usize,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<PanelState>,
    readable: Condvar,
}

/// Simulated panel. Clones share the same device.
#[derive(Debug, Clone)]
pub struct SimulatedPanel {
    shared: Arc<Shared>,
}

impl SimulatedPanel {
    /// Panel that reports `initial` as soon as it is woken.
    pub fn new(initial: DeviceState) -> Self {
        Self::build(initial, true)
    }

    /// Panel that stays quiet until [`report`](Self::report) is called or a
    /// frame is written to it.
    pub fn silent(initial: DeviceState) -> Self {
        Self::build(initial, false)
    }

    fn build(current: DeviceState, announce_on_wake: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PanelState {
                    current,
                    outbound: VecDeque::new(),
                    inbound: Vec::with_capacity(FRAME_LEN),
                    zero_run: 0,
                    written: VecDeque::with_capacity(WRITE_HISTORY),
                    wake_probes: 0,
                    announce_on_wake,
                    echo: true,
                    fail_writes: false,
                    failing_reads: 0,
                }),
                readable: Condvar::new(),
            }),
        }
    }

    /// New link handle for a [`Session`](crate::device::Session).
    pub fn link(&self) -> Box<dyn SerialLink> {
        Box::new(SimulatedLink {
            shared: Arc::clone(&self.shared),
            timeout: Duration::from_millis(100),
        })
    }

    /// Push raw bytes as if the panel had sent them.
    pub fn report_bytes(&self, bytes: &[u8]) {
        let mut state = self.lock();
        state.outbound.extend(bytes.iter().copied());
        self.shared.readable.notify_all();
    }

    /// Push a status report.
    pub fn report(&self, frame: Frame) {
        self.report_bytes(&frame);
    }

    /// Echo accepted frames back to the host (on by default).
    pub fn set_echo(&self, echo: bool) {
        self.lock().echo = echo;
    }

    /// Make every following write fail with a broken pipe.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Fail the next `count` reads with a broken pipe, as a flaky cable would.
    pub fn fail_reads(&self, count: usize) {
        self.lock().failing_reads = count;
    }

    /// Injected read failures not yet delivered.
    pub fn pending_read_failures(&self) -> usize {
        self.lock().failing_reads
    }

    /// The last [`WRITE_HISTORY`] frames received from the host, in order.
    pub fn written_frames(&self) -> Vec<Frame> {
        self.lock().written.iter().map(|(frame, _)| *frame).collect()
    }

    /// Arrival time of each frame in [`written_frames`](Self::written_frames).
    pub fn write_times(&self) -> Vec<Instant> {
        self.lock().written.iter().map(|(_, at)| *at).collect()
    }

    pub fn wake_probes(&self) -> usize {
        self.lock().wake_probes
    }

    /// State the panel believes it is in.
    pub fn current(&self) -> DeviceState {
        self.lock().current.clone()
    }

    fn lock(&self) -> MutexGuard<'_, PanelState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PanelState {
    fn accept_byte(&mut self, byte: u8) {
        if self.inbound.is_empty() && byte != SYNC {
            if byte == 0 {
                self.zero_run += 1;
                if self.zero_run == WAKE_PROBE.len() {
                    self.zero_run = 0;
                    self.wake();
                }
            } else {
                self.zero_run = 0;
            }
            return;
        }
        self.zero_run = 0;

        self.inbound.push(byte);
        let seen = self.inbound.len().min(FRAME_HEADER.len());
        if self.inbound[..seen] != FRAME_HEADER[..seen] {
            self.inbound.clear();
            return;
        }

        if self.inbound.len() == FRAME_LEN {
            let mut frame = [0u8; FRAME_LEN];
            frame.copy_from_slice(&self.inbound);
            self.inbound.clear();
            self.accept_frame(frame);
        }
    }

    fn accept_frame(&mut self, frame: Frame) {
        if self.written.len() == WRITE_HISTORY {
            self.written.pop_front();
        }
        self.written.push_back((frame, Instant::now()));

        if let Ok(fields) = crate::protocol::decode_frame_checked(&frame) {
            self.current.apply(fields);
            if self.echo {
                self.outbound.extend(frame);
            }
        }
    }

    fn wake(&mut self) {
        self.wake_probes += 1;
        if self.announce_on_wake {
            let report = self.current.to_frame();
            self.outbound.extend(report);
        }
    }
}

struct SimulatedLink {
    shared: Arc<Shared>,
    timeout: Duration,
}

impl SimulatedLink {
    fn lock(&self) -> MutexGuard<'_, PanelState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Read for SimulatedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let deadline = Instant::now() + self.timeout;
        let mut state = self.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "panel disconnected"));
        }
        while state.outbound.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data from panel"));
            }
            state = self
                .shared
                .readable
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        let n = buf.len().min(state.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for SimulatedLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "panel disconnected"));
        }

        let before = state.outbound.len();
        for &byte in buf {
            state.accept_byte(byte);
        }
        if state.outbound.len() != before {
            self.shared.readable.notify_all();
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for SimulatedLink {
    fn clear_buffers(&mut self) -> io::Result<()> {
        let mut state = self.lock();
        state.outbound.clear();
        state.inbound.clear();
        state.zero_run = 0;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>> {
        Ok(Box::new(SimulatedLink {
            shared: Arc::clone(&self.shared),
            timeout: self.timeout,
        }))
    }
}
