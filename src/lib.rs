//! Growest Connect - authorization and workflow service for the Growest
//! entrepreneur/investor platform
//!
//! ## Services
//!
//! - **Session**: Resolves a signed-in identity into role, KYC status and plan
//! - **KYC**: Document submission and admin review state machine
//! - **Premium**: Plan hierarchy and payment-backed subscriptions
//! - **Gate**: Declarative access checks with upgrade prompts
//! - **Workflow**: Connection requests, project interests and conversations
//! - **Realtime**: Change feed pushed over WebSocket

pub mod auth;
pub mod config;
pub mod db;
pub mod feed;
pub mod functions;
pub mod gate;
pub mod kyc;
pub mod premium;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;
pub mod types;
pub mod workflow;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{ConnectError, Result};
