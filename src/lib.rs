//! Window layout keeper - snapshots window positions and restores them after
//! display topology changes.
//!
//! This library exposes the engine behind the `winlayout` CLI for use in tests
//! and by platform front-ends that forward OS notifications into it.
//!
//! # Modules
//!
//! - `engine`: coordination timeline tying everything below together
//! - `stabilize`: debounces topology signals into restoration cycles
//! - `capture` / `matcher` / `restore`: snapshot, correlate, and move windows
//! - `store`: versioned slot persistence over a key-value backend
//! - `platform`: collaborator traits plus mock and file-backed desktops
//! - `config`, `error`, `logging`: ambient plumbing
#![forbid(unsafe_code)]

pub mod capture;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod identity;
pub mod logging;
pub mod matcher;
pub mod output;
pub mod pause;
pub mod platform;
pub mod restore;
pub mod stabilize;
pub mod store;
pub mod theme;
pub mod timeline;
