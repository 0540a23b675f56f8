//! # parlor-core
//!
//! Core crate for Parlor Chat. Contains configuration schemas, typed
//! identifiers, the domain message types shared with the realtime engine,
//! collaborator trait seams, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Parlor crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
