pub mod error;
pub mod types;

pub use error::DomainError;
pub use types::{
    Application, ApplicationResource, ApplicationResourceUid, ApplicationState,
    ApplicationStateUid, ApplicationStatus, ApplicationTask, ApplicationTaskStatus,
    ApplicationTaskUid, ApplicationUid, Definition, Label, LabelUid, Node, NodeCapacity, NodeUid,
    ResourceRequest, Vote, VoteUid,
};
