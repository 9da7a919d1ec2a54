//! # FleetSync Domain
//!
//! Business domain types and models for FleetSync.
//!
//! This crate contains:
//! - Twin snapshot and local fleet entity types
//! - Scheduling data types (layers, plannings, schedules, planning commands)
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants
//!
//! ## Architecture
//! - No dependencies on other FleetSync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
