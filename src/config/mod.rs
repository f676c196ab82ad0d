//! Configuration management: a single TOML file loaded once at startup.

mod config;

pub use config::*;
