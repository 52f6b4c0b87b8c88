//! CLI utilities for rtcvoice.
//!
//! This crate provides the context-based configuration shared by rtcvoice
//! command line tools.

pub mod config;

pub use config::{Config, Context, load_config};
