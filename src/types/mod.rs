//! Shared types for Growest Connect

pub mod error;

pub use error::{ConnectError, Result};
