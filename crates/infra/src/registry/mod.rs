//! HTTP adapter for the external twin registry.

pub mod client;

pub use client::{RegistryClient, RegistryClientConfig};
