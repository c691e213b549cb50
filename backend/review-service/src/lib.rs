//! Review Service
//!
//! Producers hand raw footage to delegates, review the edits, and publish
//! approved cuts to the video platform under their own delegated credential.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

// Public re-exports
pub use config::Config;
pub use error::{Result, ReviewError};
pub use state::{AppState, HttpSettings};
