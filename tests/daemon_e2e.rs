//! End-to-end tests: a real daemon on a temp-dir socket, backed by a
//! simulated panel.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use neewerctl::client::DaemonClient;
use neewerctl::config::{LightProfile, SerialSettings};
use neewerctl::control::LightController;
use neewerctl::daemon::{Daemon, ShutdownHandle};
use neewerctl::device::{Session, SimulatedPanel};
use neewerctl::error::NeewerError;
use neewerctl::protocol::{DeviceState, decode_frame_checked, encode_frame};
use neewerctl::storage::{DaemonConfig, StateStore};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    socket: PathBuf,
    state_file: PathBuf,
    panel: SimulatedPanel,
    shutdown: ShutdownHandle,
    server: Option<JoinHandle<neewerctl::Result<()>>>,
}

impl Harness {
    fn start(panel: SimulatedPanel) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("neewer.sock");
        let state_file = dir.path().join("state").join("state.json");

        let settings = SerialSettings {
            write_pacing: Duration::from_millis(5),
            settle: Duration::from_millis(1),
            read_timeout: Duration::from_millis(20),
            ..SerialSettings::default()
        };
        let session = Session::from_link("sim", panel.link(), &settings).unwrap();

        let config = DaemonConfig {
            socket_path: socket.clone(),
            port: "sim".into(),
            request_timeout_ms: 500,
            reply_linger_ms: 10,
        };
        let daemon = Daemon::bind(config, Arc::new(session), DeviceState::default()).unwrap();
        let shutdown = daemon.shutdown_handle();
        let server = std::thread::spawn(move || daemon.serve());

        Self {
            _dir: dir,
            socket,
            state_file,
            panel,
            shutdown,
            server: Some(server),
        }
    }

    fn client(&self) -> DaemonClient {
        DaemonClient::new(&self.socket)
    }

    fn controller(&self) -> LightController {
        LightController::new(self.client(), StateStore::at(&self.state_file))
    }

    fn join(&mut self) -> neewerctl::Result<()> {
        match self.server.take() {
            Some(handle) => handle.join().unwrap(),
            None => Ok(()),
        }
    }

    /// Poll get-state until `check` passes.
    fn wait_for_state(&self, check: impl Fn(&DeviceState) -> bool) -> DeviceState {
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let state = self.client().get_state("sim").unwrap();
            if check(&state) || Instant::now() >= deadline {
                return state;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.trigger();
        let _ = self.join();
    }
}

#[test]
fn test_get_state_waits_for_first_report() {
    let panel = SimulatedPanel::silent(DeviceState::default());
    let harness = Harness::start(panel.clone());

    let (tx, rx) = mpsc::channel();
    let client = harness.client();
    std::thread::spawn(move || {
        let _ = tx.send(client.get_state("sim"));
    });

    // No report yet: the request is held, not answered with defaults.
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    panel.report(encode_frame(true, 42, 3400));
    let state = rx.recv_timeout(Duration::from_secs(3)).unwrap().unwrap();
    assert!(state.power);
    assert_eq!(state.brightness, 42);
    assert_eq!(state.temp_byte(), DeviceState::new("", true, 42, 3400).temp_byte());
}

#[test]
fn test_requests_abandoned_before_ready_are_not_executed() {
    let panel = SimulatedPanel::silent(DeviceState::default());
    let harness = Harness::start(panel.clone());
    let impatient = harness.client().with_timeout(Duration::from_millis(100));

    let frame = encode_frame(true, 77, 5000);
    let err = impatient.send_command(&frame).unwrap_err();
    assert!(matches!(err, NeewerError::InvalidResponse { .. }));
    let err = impatient.stop().unwrap_err();
    assert!(matches!(err, NeewerError::InvalidResponse { .. }));

    panel.report(encode_frame(false, 20, 3000));
    let state = harness.client().get_state("sim").unwrap();
    assert_eq!(state.brightness, 20);

    // Give the backlogged handlers time to run.
    std::thread::sleep(Duration::from_millis(300));
    assert!(!panel.written_frames().contains(&frame));
    assert!(harness.socket.exists());
    assert!(!harness.client().get_state("sim").unwrap().power);
}

#[test]
fn test_concurrent_get_state_snapshots_match() {
    let panel = SimulatedPanel::new(DeviceState::new("sim", true, 64, 5200));
    let harness = Harness::start(panel);
    harness.wait_for_state(|s| s.power);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = harness.client();
            std::thread::spawn(move || client.get_state("sim").unwrap())
        })
        .collect();
    let states: Vec<DeviceState> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for state in &states {
        assert_eq!(state, &states[0]);
    }
    assert_eq!(states[0].brightness, 64);
}

#[test]
fn test_set_is_forwarded_and_mirrored() {
    let panel = SimulatedPanel::new(DeviceState::default());
    let harness = Harness::start(panel.clone());
    harness.wait_for_state(|_| true);

    let frame = encode_frame(true, 80, 4500);
    harness.client().send_command(&frame).unwrap();
    assert!(panel.written_frames().contains(&frame));

    let state = harness.wait_for_state(|s| s.brightness == 80);
    assert!(state.power);
    assert_eq!(state.brightness, 80);
    assert_eq!(state.temp_byte(), 0x10);
}

#[test]
fn test_get_state_never_sees_torn_state() {
    let a = DeviceState::new("sim", true, 10, 3000);
    let b = DeviceState::new("sim", false, 90, 6500);

    let panel = SimulatedPanel::new(a.clone());
    let harness = Harness::start(panel);
    harness.wait_for_state(|s| s.power);

    let done = Arc::new(AtomicBool::new(false));
    let setter = {
        let client = harness.client();
        let done = Arc::clone(&done);
        let (a, b) = (a.to_frame(), b.to_frame());
        std::thread::spawn(move || {
            for i in 0..20 {
                client.send_command(if i % 2 == 0 { &b } else { &a }).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let reply = |s: &DeviceState| (s.power, s.brightness, s.temp_byte());
    let allowed = [reply(&a), reply(&b)];
    while !done.load(Ordering::SeqCst) {
        let state = harness.client().get_state("sim").unwrap();
        assert!(allowed.contains(&reply(&state)), "torn state: {:?}", state);
    }
    setter.join().unwrap();
}

#[test]
fn test_malformed_request_is_dropped() {
    let panel = SimulatedPanel::new(DeviceState::default());
    let harness = Harness::start(panel.clone());
    harness.wait_for_state(|_| true);
    let before = panel.written_frames().len();

    let mut frame = encode_frame(true, 80, 4500);
    frame[5] ^= 0x01;
    assert!(decode_frame_checked(&frame).is_err());

    let mut stream = UnixStream::connect(&harness.socket).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    stream.write_all(&frame).unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).unwrap();

    assert!(reply.is_empty());
    assert_eq!(panel.written_frames().len(), before);

    // The daemon keeps serving.
    harness.client().get_state("sim").unwrap();
}

#[test]
fn test_stop_twice_reports_unreachable() {
    let panel = SimulatedPanel::new(DeviceState::default());
    let mut harness = Harness::start(panel);
    harness.wait_for_state(|_| true);

    harness.client().stop().unwrap();
    harness.join().unwrap();
    assert!(!harness.socket.exists());

    let err = harness.client().stop().unwrap_err();
    assert!(matches!(err, NeewerError::DaemonUnreachable { .. }));
}

#[test]
fn test_controller_round_trip() {
    let panel = SimulatedPanel::new(DeviceState::default());
    let harness = Harness::start(panel.clone());
    harness.wait_for_state(|_| true);
    let lights = harness.controller();

    let requested = lights.apply_profile(&LightProfile::Candle, "sim").unwrap();
    assert_eq!(requested.temperature, 3400);
    assert_eq!(StateStore::at(&harness.state_file).load().unwrap(), requested);

    harness.wait_for_state(|s| s.power && s.brightness == 28);

    let off = lights.power_off("sim").unwrap();
    assert!(!off.power);
    assert_eq!(off.brightness, 28);
    assert!(!panel.current().power);

    let on = lights.power_on("sim").unwrap();
    assert!(on.power);
    assert_eq!(on.brightness, 28);
}
