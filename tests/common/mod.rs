//! Common test utilities for winlayout.
//!
//! - `fixtures`: desktops, engines, and on-disk workspaces
//! - `timeline`: helpers for driving the engine's timers deterministically
#![allow(dead_code)]

pub mod fixtures;
pub mod timeline;

use tracing_subscriber::EnvFilter;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
