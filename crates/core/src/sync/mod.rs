//! Fleet state reconciliation.
//!
//! Two reconcilers pull twin snapshots from the registry and merge them into
//! the local mirror under version-gated semantics: a twin is applied only
//! when its version strictly exceeds the stored one, tag children are
//! replaced wholesale, and devices absent from a completed enumeration are
//! garbage-collected at the end of the run.

pub mod device_reconciler;
pub mod edge_reconciler;
pub mod twin_mapper;

pub use device_reconciler::DeviceReconciler;
pub use edge_reconciler::EdgeDeviceReconciler;

/// Outcome counters for one reconciliation run, used for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Twins with no local counterpart, inserted unconditionally.
    pub created: usize,
    /// Version-gated merges applied.
    pub updated: usize,
    /// Twins whose version did not exceed the stored one.
    pub unchanged: usize,
    /// Twins skipped: missing model tag, unknown model or failed enrichment.
    pub skipped: usize,
    /// Local devices deleted by coverage garbage collection.
    pub deleted: usize,
}
