use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid uid: {0}")]
    InvalidUid(String),

    #[error("invalid label version: {0}")]
    InvalidLabelVersion(i64),

    #[error("temporary label (version=0) must carry a remove_at")]
    TemporaryLabelMissingRemoveAt,

    #[error("remove_at {remove_at} is out of range [{min}, {max}]")]
    RemoveAtOutOfRange { remove_at: i64, min: i64, max: i64 },

    #[error("visible_for must be non-empty for a non-privileged creator")]
    VisibleForEmpty,

    #[error("visible_for entry '{0}' is not owned by, or a group of, the caller")]
    VisibleForNotOwned(String),

    #[error("label has no definitions")]
    NoDefinitions,

    #[error("invalid definition index: {0}")]
    InvalidDefinitionIndex(usize),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("label name may not change on update")]
    LabelNameImmutable,
}
