pub mod api;
pub mod config;
pub mod error;
pub mod exam;
pub mod session;

pub use error::{Result, SyncError};
