//! Unix socket server and request dispatcher.
//!
//! The daemon owns the serial session and answers 8-byte requests on a Unix
//! socket. Each connection carries exactly one request:
//!
//! | Request         | Reply                                   |
//! |-----------------|-----------------------------------------|
//! | stop magic      | `0x01`, then the daemon shuts down      |
//! | get-state magic | `[power, brightness, temp_byte]`        |
//! | valid frame     | `0x01` after the frame reached the port |
//! | anything else   | connection closed without a reply       |
//!
//! Requests from clients that hung up while waiting in the backlog are
//! dropped unexecuted.

use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::daemon::mirror::{ReadyLatch, SharedState, StateMirror};
use crate::device::Session;
use crate::error::{NeewerError, Result};
use crate::protocol::{ACK, DeviceState, REQUEST_LEN, Request, encode_state_reply, hex};
use crate::storage::DaemonConfig;

// =============================================================================
// Constants
// =============================================================================

/// Socket file mode: any local user may talk to the daemon.
pub const SOCKET_MODE: u32 = 0o666;

/// How often startup logs while waiting for the first device report.
const READY_LOG_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// Shutdown
// =============================================================================

/// Stops a running daemon. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    socket_path: PathBuf,
}

impl ShutdownHandle {
    /// Request shutdown.
    ///
    /// Removes the socket file so new clients fail fast, and dials the socket
    /// once to wake a blocked `accept`. Returns `true` only for the call that
    /// initiated shutdown.
    pub fn trigger(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }

        info!(path = %self.socket_path.display(), "Shutdown requested");
        let _ = UnixStream::connect(&self.socket_path);
        if let Err(e) = clear_socket_file(&self.socket_path) {
            warn!(error = %e, "Failed to remove socket");
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Daemon
// =============================================================================

/// A bound daemon, ready to [`serve`](Self::serve).
pub struct Daemon {
    config: DaemonConfig,
    listener: UnixListener,
    session: Arc<Session>,
    state: SharedState,
    ready: ReadyLatch,
    running: Arc<AtomicBool>,
}

impl Daemon {
    /// Bind the socket and serve until stopped.
    ///
    /// # Errors
    /// Returns `ListenerFailure` if the socket cannot be bound or served.
    pub fn run(config: DaemonConfig, session: Arc<Session>, initial: DeviceState) -> Result<()> {
        Self::bind(config, session, initial)?.serve()
    }

    /// Bind the socket without serving yet.
    ///
    /// A stale socket file left by a crashed daemon is replaced; a live one is
    /// an error. Clients may connect as soon as this returns, their requests
    /// are answered once [`serve`](Self::serve) has seen the first device
    /// report.
    ///
    /// # Errors
    /// Returns `ListenerFailure` if binding or setting permissions fails.
    pub fn bind(config: DaemonConfig, session: Arc<Session>, initial: DeviceState) -> Result<Self> {
        let path = config.socket_path.as_path();
        let listener = bind_socket(path)?;
        fs::set_permissions(path, fs::Permissions::from_mode(SOCKET_MODE))
            .map_err(|e| NeewerError::listener(path, e))?;

        info!(path = %path.display(), port = %session.port(), "Daemon listening");

        Ok(Self {
            config,
            listener,
            session,
            state: SharedState::new(initial),
            ready: ReadyLatch::new(),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
            socket_path: self.config.socket_path.clone(),
        }
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn ready(&self) -> ReadyLatch {
        self.ready.clone()
    }

    /// Run the mirror and the accept loop until a stop request or
    /// [`ShutdownHandle::trigger`].
    ///
    /// On return the mirror has been joined, the session closed and the socket
    /// file removed.
    ///
    /// # Errors
    /// Returns `ListenerFailure` if `accept` fails, or `Io` if the mirror
    /// thread cannot start.
    pub fn serve(self) -> Result<()> {
        let mirror = StateMirror::spawn(
            Arc::clone(&self.session),
            self.state.clone(),
            self.ready.clone(),
            Arc::clone(&self.running),
        )?;

        let result = if self.wait_ready() {
            self.accept_loop()
        } else {
            Ok(())
        };

        self.running.store(false, Ordering::SeqCst);
        if mirror.join().is_err() {
            warn!("State mirror thread panicked");
        }
        self.session.close();
        if let Err(e) = clear_socket_file(&self.config.socket_path) {
            warn!(error = %e, "Failed to remove socket");
        }

        info!("Daemon stopped");
        result
    }

    /// Block until the first device report. Returns `false` if shutdown was
    /// requested first.
    fn wait_ready(&self) -> bool {
        let poll = READY_LOG_INTERVAL
            .min(self.config.request_timeout())
            .max(Duration::from_millis(50));
        while !self.ready.wait_timeout(poll) {
            if !self.running.load(Ordering::SeqCst) {
                return false;
            }
            info!(port = %self.session.port(), "Waiting for first device report");
        }
        info!("Device ready, accepting requests");
        self.running.load(Ordering::SeqCst)
    }

    fn accept_loop(&self) -> Result<()> {
        let dispatcher = Dispatcher {
            session: Arc::clone(&self.session),
            state: self.state.clone(),
            ready: self.ready.clone(),
            shutdown: self.shutdown_handle(),
            request_timeout: self.config.request_timeout(),
            reply_linger: self.config.reply_linger(),
        };

        for stream in self.listener.incoming() {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            match stream {
                Ok(stream) => {
                    let dispatcher = dispatcher.clone();
                    let spawned = std::thread::Builder::new()
                        .name("connection".into())
                        .spawn(move || dispatcher.handle(stream));
                    if let Err(e) = spawned {
                        warn!(error = %e, "Failed to spawn connection handler");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(NeewerError::listener(&self.config.socket_path, e)),
            }
        }

        Ok(())
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Per-connection request handling.
#[derive(Clone)]
struct Dispatcher {
    session: Arc<Session>,
    state: SharedState,
    ready: ReadyLatch,
    shutdown: ShutdownHandle,
    request_timeout: Duration,
    reply_linger: Duration,
}

impl Dispatcher {
    fn handle(&self, stream: UnixStream) {
        match self.dispatch(stream) {
            Ok(request) => debug!(request = request.name(), "Request handled"),
            Err(e @ NeewerError::ClientHungUp { .. }) => info!(error = %e, "Dropped request"),
            Err(
                e @ (NeewerError::MalformedFrame { .. } | NeewerError::IncompleteRequest { .. }),
            ) => warn!(error = %e, "Rejected request"),
            Err(e) => warn!(error = %e, "Connection failed"),
        }
    }

    fn dispatch(&self, mut stream: UnixStream) -> Result<Request> {
        stream.set_read_timeout(Some(self.request_timeout))?;
        stream.set_write_timeout(Some(self.request_timeout))?;

        let bytes = read_request(&mut stream)?;
        let request = Request::classify(&bytes)?;
        debug!(request = request.name(), bytes = %hex(&bytes), "Received request");

        if peer_hung_up(&mut stream)? {
            return Err(NeewerError::ClientHungUp {
                request: request.name(),
            });
        }

        match request {
            Request::Stop => {
                stream.write_all(&[ACK])?;
                stream.flush()?;
                self.shutdown.trigger();
            }
            Request::GetState => {
                self.ready.wait();
                let snapshot = self.state.snapshot();
                stream.write_all(&encode_state_reply(&snapshot))?;
                stream.flush()?;
                std::thread::sleep(self.reply_linger);
            }
            Request::Set(frame) => {
                self.session.write(&frame)?;
                stream.write_all(&[ACK])?;
                stream.flush()?;
            }
        }

        Ok(request)
    }
}

/// Read exactly one request.
///
/// A peer that hangs up or stalls before sending all bytes yields
/// `IncompleteRequest` with the count actually received.
fn read_request(stream: &mut UnixStream) -> Result<[u8; REQUEST_LEN]> {
    let mut buf = [0u8; REQUEST_LEN];
    let mut filled = 0;

    while filled < REQUEST_LEN {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if filled < REQUEST_LEN {
        return Err(NeewerError::IncompleteRequest {
            expected: REQUEST_LEN,
            received: filled,
        });
    }
    Ok(buf)
}

/// Whether the client already closed its end.
///
/// Connections queue in the backlog until the first device report arrives, so
/// a client may have timed out and left before its request is read.
fn peer_hung_up(stream: &mut UnixStream) -> Result<bool> {
    stream.set_nonblocking(true)?;
    let mut extra = [0u8; 1];
    let outcome = stream.read(&mut extra);
    stream.set_nonblocking(false)?;

    match outcome {
        Ok(0) => Ok(true),
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::ConnectionReset => Ok(true),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Socket File Helpers
// =============================================================================

/// Bind `path`, creating its directory and replacing a socket file that no
/// daemon answers on.
fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| NeewerError::listener(path, e))?;
    }

    let in_use = match UnixListener::bind(path) {
        Ok(listener) => return Ok(listener),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse && path.exists() => e,
        Err(e) => return Err(NeewerError::listener(path, e)),
    };

    if UnixStream::connect(path).is_ok() {
        let live = io::Error::new(in_use.kind(), "another daemon is answering on it");
        return Err(NeewerError::listener(path, live));
    }

    debug!(path = %path.display(), "Replacing stale socket");
    clear_socket_file(path)?;
    UnixListener::bind(path).map_err(|e| NeewerError::listener(path, e))
}

fn clear_socket_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(NeewerError::listener(path, e)),
        _ => Ok(()),
    }
}
