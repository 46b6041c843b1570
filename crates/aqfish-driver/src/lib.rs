pub mod driver;
pub mod error;
pub mod local;
pub mod registry;

pub use driver::{AllocateResult, AvailableCapacity, Driver, DriverStatus};
pub use error::DriverError;
pub use local::TestDriver;
pub use registry::DriverRegistry;
