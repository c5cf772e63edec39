//! Reelcast - byte-range video server and transcode orchestrator
//!
//! This library crate exposes the core functionality for integration testing.

pub mod cache;
pub mod config;
pub mod conversion;
pub mod server;
pub mod streaming;
