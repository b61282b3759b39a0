//! Configuration for the portpub allocation engine.
//!
//! The engine configuration lives in `~/.config/portpub/config.yaml` (or the
//! file named by `PORTPUB_CONFIG`) and can be overridden per invocation via
//! `PORTPUB_*` environment variables.

pub mod config;
pub mod loader;

pub use config::{EngineConfig, EphemeralRange};
pub use loader::ConfigLoader;
