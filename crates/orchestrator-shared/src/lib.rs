//! # orchestrator-shared
//!
//! Data model, configuration, error taxonomy, and resilience primitives
//! shared by the execution engine's eight components. No component logic
//! lives here — only the types and pure functions every component depends
//! on (mirrors the teacher's `tasker-shared` crate).

pub mod config;
pub mod errors;
pub mod jsonrpc;
pub mod models;
pub mod resilience;
