//! Borgmatic config generator library
//!
//! Builds borgmatic job configurations for a compose-based backup stack and
//! keeps the shared compose override in sync with the configured jobs.

pub mod commands;
pub mod compose;
pub mod features;
pub mod instructions;
pub mod job;
pub mod passphrase;
pub mod restore;
pub mod settings;
pub mod setup;
pub mod ssh;
pub mod synth;
pub mod utils;

// Re-export commonly used types
pub use settings::Settings;
pub use utils::errors::GenError;
pub type Result<T> = std::result::Result<T, GenError>;
