//! Recall Core Library
//!
//! This crate provides the foundational utilities shared by every Recall crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Application configuration

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, Overrides};
pub use error::{AppError, AppResult};
