pub mod lifecycle;
pub mod registry;
pub mod socket_device;
pub mod traits;

pub use lifecycle::ManagedSource;
pub use registry::{DeviceRegistry, SOCKET_SOURCE};
pub use socket_device::SocketDevice;
pub use traits::{DeviceSource, DeviceState};
