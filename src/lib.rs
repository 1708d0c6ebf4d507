//! crosstrace client library
//!
//! The CLI binary lives in `main.rs`; this library exposes the parts that
//! are useful on their own (configuration and payload argument parsing).

pub mod config;
pub mod raw_args;

pub use config::ClientConfig;
