//! # quire-core
//!
//! Core crate for Quire. Contains the configuration schemas shared by the
//! plugin engine and the CLI, plus the unified error system.
//!
//! This crate has **no** internal dependencies on other Quire crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
