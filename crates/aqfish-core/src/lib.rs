pub mod election;
pub mod error;
pub mod fitness;
pub mod mailbox;
pub mod maintenance;
pub mod pickup;
pub mod supervisor;
pub mod sweeper;

pub use election::{cast_vote, collect_votes, select_winner};
pub use error::CoreError;
pub use fitness::Fitness;
pub use mailbox::ApplicationMailbox;
pub use maintenance::MaintenanceController;
pub use pickup::PickupLoop;
pub use sweeper::CleanupSweeper;
