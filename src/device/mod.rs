//! Device layer for Neewer serial panels.
//!
//! Provides the serial session that owns the port and a simulated panel for
//! running without hardware.

pub mod link;
pub mod session;
pub mod sim;

pub use link::{SerialLink, list_ports};
pub use session::{ReadOutcome, Session};
pub use sim::SimulatedPanel;
