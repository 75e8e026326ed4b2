//! Configuration management
//!
//! Settings are merged from several sources, highest priority first:
//!
//! 1. Environment variables (`PROVIS_*`)
//! 2. Project `provis.json`
//! 3. Global `provis.json` in the platform config directory (or `PROVIS_HOME`)
//! 4. Built-in defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use provis_core::config::Config;
//! use std::path::Path;
//!
//! let config = Config::build(Some(Path::new("/path/to/project")), true).unwrap();
//! println!("Solver timeout: {}s", config.solver_timeout);
//! ```

mod config;
mod source;

pub use config::Config;
pub use source::{ConfigLoader, ConfigSource, RawConfig};
