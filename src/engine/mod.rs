//! # Engine Module
//!
//! Host-side orchestration of GPU compute work.
//!
//! This module contains:
//! - Buffer kinds, identifiers and dispatch geometry (`types`)
//! - The kernel argument model (`args`)
//! - The compute engine and its device resource caches (`manager`)
//! - The batch protocol: builders and the wait gate (`batch`)
//! - Configuration and error types
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod args;
pub mod manager;
pub mod batch;
