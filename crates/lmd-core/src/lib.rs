//! lmd-core: Core types, configuration, logging, and wire protocol for lmd.

pub mod config;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod paths;

pub use config::Config;
pub use error::{Error, Result};
