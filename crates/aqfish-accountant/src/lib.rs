mod error;
mod evaluate;

pub use error::CapacityError;
pub use evaluate::{evaluate, DriverProbe, FitnessResult, NodeSlots};
