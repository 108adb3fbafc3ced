//! Utility modules for the config generator.

pub mod errors;
pub mod fs;
pub mod logger;

pub use errors::{GenError, Result};
