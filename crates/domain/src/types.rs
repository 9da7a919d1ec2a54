//! Domain data types for twins, fleet entities and scheduling.

pub mod device;
pub mod edge;
pub mod scheduling;
pub mod twin;

pub use device::{Device, DeviceModel, DeviceTag, LorawanDevice};
pub use edge::{EdgeDevice, EdgeModule};
pub use scheduling::{
    ClockTime, DayOffMask, Layer, PayloadCommand, Planning, PlanningCommand, Schedule,
    ALL_WEEKDAYS,
};
pub use twin::{Twin, TwinPage};
