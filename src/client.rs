//! Client side of the daemon socket protocol.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{NeewerError, Result};
use crate::protocol::{
    ACK, DeviceState, Frame, GET_STATE_MAGIC, REQUEST_LEN, STATE_REPLY_LEN, STOP_MAGIC,
    decode_state_reply, hex,
};
use crate::storage::DEFAULT_SOCKET_PATH;

/// Default socket read/write timeout.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// One-shot requests against a running daemon.
///
/// Every call opens a fresh connection, sends one 8-byte request and reads
/// the fixed-size reply.
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new(DEFAULT_SOCKET_PATH)
    }
}

impl DaemonClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Dial the daemon.
    ///
    /// # Errors
    /// Returns `DaemonUnreachable` if nothing is listening on the socket.
    pub fn connect(&self) -> Result<UnixStream> {
        let stream = UnixStream::connect(&self.socket_path).map_err(|source| {
            NeewerError::DaemonUnreachable {
                path: self.socket_path.clone(),
                source,
            }
        })?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }

    /// Fetch the mirrored panel state.
    ///
    /// The temperature is quantized to what the panel reports; `port` is only
    /// a label attached to the result.
    ///
    /// # Errors
    /// Returns `DaemonUnreachable` if no daemon is running, or
    /// `InvalidResponse` on a short or out-of-range reply.
    pub fn get_state(&self, port: &str) -> Result<DeviceState> {
        let reply = self.request(&GET_STATE_MAGIC, STATE_REPLY_LEN)?;
        decode_state_reply(&reply, port)
    }

    /// Forward a frame to the panel.
    ///
    /// # Errors
    /// Returns `InvalidResponse` if the daemon rejects the frame or does not
    /// acknowledge it.
    pub fn send_command(&self, frame: &Frame) -> Result<()> {
        let reply = self.request(frame, 1)?;
        expect_ack(&reply, "set")
    }

    /// Ask the daemon to shut down.
    ///
    /// # Errors
    /// Returns `DaemonUnreachable` if no daemon is running.
    pub fn stop(&self) -> Result<()> {
        let reply = self.request(&STOP_MAGIC, 1)?;
        expect_ack(&reply, "stop")
    }

    fn request(&self, bytes: &[u8; REQUEST_LEN], reply_len: usize) -> Result<Vec<u8>> {
        let mut stream = self.connect()?;
        debug!(path = %self.socket_path.display(), request = %hex(bytes), "Sending request");

        stream.write_all(bytes)?;
        stream.flush()?;
        read_reply(&mut stream, reply_len)
    }
}

/// Read up to `len` bytes, stopping early at EOF.
fn read_reply(stream: &mut UnixStream, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;

    while filled < len {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                return Err(NeewerError::InvalidResponse {
                    message: format!("no reply after {} of {} bytes", filled, len),
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    buf.truncate(filled);
    Ok(buf)
}

fn expect_ack(reply: &[u8], request: &str) -> Result<()> {
    match reply {
        [ACK] => Ok(()),
        [] => Err(NeewerError::InvalidResponse {
            message: format!(
                "daemon closed the connection without acknowledging {}",
                request
            ),
        }),
        other => Err(NeewerError::InvalidResponse {
            message: format!("unexpected {} reply [{}]", request, hex(other)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    /// Answer a single connection with `reply`, returning the request bytes.
    fn one_shot_server(path: &Path, reply: Vec<u8>) -> std::thread::JoinHandle<Vec<u8>> {
        let listener = UnixListener::bind(path).unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = [0u8; REQUEST_LEN];
            stream.read_exact(&mut request).unwrap();
            stream.write_all(&reply).unwrap();
            request.to_vec()
        })
    }

    #[test]
    fn test_unreachable_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let client = DaemonClient::new(dir.path().join("missing.sock"));

        let err = client.stop().unwrap_err();
        assert!(matches!(err, NeewerError::DaemonUnreachable { .. }));
        assert!(err.to_string().contains("daemon start"));
    }

    #[test]
    fn test_get_state_decodes_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.sock");
        let server = one_shot_server(&path, vec![1, 80, 16]);

        let state = DaemonClient::new(&path).get_state("/dev/ttyUSB0").unwrap();
        assert_eq!(server.join().unwrap(), GET_STATE_MAGIC.to_vec());
        assert!(state.power);
        assert_eq!(state.brightness, 80);
        assert_eq!(state.temp_byte(), 16);
        assert_eq!(state.port, "/dev/ttyUSB0");
    }

    #[test]
    fn test_short_state_reply_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.sock");
        let server = one_shot_server(&path, vec![1, 80]);

        let err = DaemonClient::new(&path).get_state("").unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, NeewerError::InvalidResponse { .. }));
    }

    #[test]
    fn test_send_command_requires_ack() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.sock");
        let frame = crate::protocol::encode_frame(true, 80, 4500);

        let server = one_shot_server(&path, vec![ACK]);
        DaemonClient::new(&path).send_command(&frame).unwrap();
        assert_eq!(server.join().unwrap(), frame.to_vec());

        std::fs::remove_file(&path).unwrap();
        let server = one_shot_server(&path, vec![]);
        let err = DaemonClient::new(&path).send_command(&frame).unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, NeewerError::InvalidResponse { .. }));

        std::fs::remove_file(&path).unwrap();
        let server = one_shot_server(&path, vec![0x02]);
        let err = DaemonClient::new(&path).send_command(&frame).unwrap_err();
        server.join().unwrap();
        assert!(matches!(err, NeewerError::InvalidResponse { .. }));
    }

    #[test]
    fn test_silent_daemon_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.sock");
        let _listener = UnixListener::bind(&path).unwrap();

        // Connection sits in the backlog and is never answered.
        let client = DaemonClient::new(&path).with_timeout(Duration::from_millis(50));
        let err = client.stop().unwrap_err();
        assert!(matches!(err, NeewerError::InvalidResponse { .. }));
    }
}
