//! Shared types for sockshare transports, the connection core and the UI hooks.

pub mod config;
pub mod error;
pub mod models;

pub use config::*;
pub use error::*;
pub use models::*;
