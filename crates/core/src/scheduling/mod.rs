//! Schedule resolution and command dispatch.
//!
//! Resolution is a pure function over freshly fetched layers, plannings,
//! schedules and the device roster; dispatch evaluates the resolved
//! structures against the current local time in a configured timezone and
//! sends the matching commands.

pub mod dispatcher;
pub mod ports;
pub mod resolver;

pub use dispatcher::{CommandDispatcher, DispatchReport};
pub use ports::{CommandExecutor, PlanningSource};
pub use resolver::resolve_schedules;
