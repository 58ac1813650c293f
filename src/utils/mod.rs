//! Utility functions and helpers.
//!
//! Environment variable lookups shared by the configuration types.

pub mod env;

pub use env::{get_env_bool, get_env_list, get_env_with_prefix};
