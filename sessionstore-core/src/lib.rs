//! Sessionstore Core - Session record and storage provider contract
//!
//! This crate defines the data entity every backend persists, the capability set
//! every backend implements, and the error, configuration and logging
//! infrastructure shared by the rest of the workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod token;
pub mod traits;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use session::*;
pub use token::*;
pub use traits::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tracing;
