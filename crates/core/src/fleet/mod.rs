//! Fleet store ports.

pub mod ports;

pub use ports::{
    DeviceModelRepository, DeviceRepository, EdgeDeviceRepository, FleetUnitOfWork,
    LorawanDeviceRepository,
};
