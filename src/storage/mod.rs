//! On-disk storage.
//!
//! Handles the persisted light state and the app configuration file.

pub mod config;
pub mod state;

// Re-export commonly used items
pub use config::*;
pub use state::{StateStore, get_state_path};
