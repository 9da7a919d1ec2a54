//! # FleetSync Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The device and edge-device reconcilers
//! - Schedule resolution and command dispatch
//! - Port/adapter interfaces (traits)
//!
//! ## Architecture Principles
//! - Only depends on `fleetsync-domain`
//! - No database, HTTP, or scheduler code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod fleet;
pub mod registry;
pub mod scheduling;
pub mod sync;

// Re-export specific items to avoid ambiguity
pub use fleet::ports::{
    DeviceModelRepository, DeviceRepository, EdgeDeviceRepository, FleetUnitOfWork,
    LorawanDeviceRepository,
};
pub use registry::ports::TwinRegistry;
pub use scheduling::dispatcher::{CommandDispatcher, DispatchReport};
pub use scheduling::ports::{CommandExecutor, PlanningSource};
pub use scheduling::resolver::resolve_schedules;
pub use sync::device_reconciler::DeviceReconciler;
pub use sync::edge_reconciler::EdgeDeviceReconciler;
pub use sync::SyncReport;
