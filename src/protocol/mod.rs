//! Wire protocols for Neewer panels.
//!
//! This module contains the serial frame codec, the light state model, and
//! the 8-byte request protocol spoken on the daemon socket.

pub mod frame;
pub mod request;
pub mod state;

pub use frame::*;
pub use request::*;
pub use state::*;
