//! Foundation crate for portpub.
//!
//! Holds the shared error type, user path helpers, tracing setup and the
//! console output macros used by the binary.

pub mod error;
pub mod output_macros;
pub mod tracing_init;
pub mod user_paths;

pub use error::{CoreError, Result};
