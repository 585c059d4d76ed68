//! Light daemon: serial session owner and Unix socket server.
//!
//! Provides the state mirror that tracks device reports and the server that
//! dispatches socket requests to the panel.

pub mod mirror;
pub mod server;

pub use mirror::{FrameAssembler, ReadyLatch, SharedState, StateMirror};
pub use server::{Daemon, ShutdownHandle};
