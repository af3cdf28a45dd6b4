//! Shared infrastructure for docpipe.
//!
//! This crate carries the pieces every other docpipe crate leans on: atomic
//! file writes, the session directory layout, the error taxonomy, and
//! tracing initialization.

pub mod atomic_write;
pub mod error;
pub mod logging;
pub mod paths;
pub mod types;
