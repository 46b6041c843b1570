use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("node slot limit reached: {occupied}/{limit} slots occupied")]
    NodeSlotsExhausted { occupied: u32, limit: u32 },

    #[error("label has no definitions to evaluate")]
    NoDefinitions,

    #[error("no definition available: driver disabled, in maintenance, or over limit for all {tried} candidates")]
    NoAvailableDefinition { tried: usize },
}
