//! Configuration module
//!
//! Provides configuration types and loading from YAML files and
//! environment variables.

pub mod loader;
pub mod types;

pub use loader::{load_from_env, load_from_yaml};
pub use types::{WriteMode, WriterConfig};
