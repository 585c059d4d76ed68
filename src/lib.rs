//! Neewer Light Control Library
//!
//! A Rust driver and daemon for Neewer LED panels attached over USB serial.
//!
//! # Features
//!
//! - Encode and decode the panel's 8-byte serial frames
//! - Run a daemon that owns the serial port and mirrors the panel state
//! - Talk to the daemon over a Unix socket from any local process
//! - Apply pre-defined or custom light profiles
//!
//! # Example
//!
//! ```no_run
//! use neewerctl::client::DaemonClient;
//! use neewerctl::control::LightController;
//! use neewerctl::config::LightProfile;
//! use neewerctl::storage::StateStore;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = DaemonClient::default();
//!
//!     // Read the mirrored panel state
//!     let state = client.get_state("/dev/ttyUSB0")?;
//!     println!("{}", state);
//!
//!     // Change it and remember the request
//!     let lights = LightController::new(client, StateStore::open_default()?);
//!     lights.set(true, 80, 4500, "/dev/ttyUSB0")?;
//!
//!     // Or use a profile
//!     lights.apply_profile(&LightProfile::Sunset, "/dev/ttyUSB0")?;
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod control;
pub mod daemon;
pub mod device;
pub mod error;
pub mod protocol;
pub mod service;
pub mod storage;

// Re-exports for convenience
pub use client::DaemonClient;
pub use control::LightController;
pub use daemon::Daemon;
pub use device::Session;
pub use error::{NeewerError, Result};
pub use protocol::{DeviceState, Frame};
