use thiserror::Error;

use aqfish_domain::ApplicationStatus;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("domain error: {0}")]
    Domain(#[from] aqfish_domain::DomainError),

    #[error("illegal state transition: {from} -> {to}")]
    InvalidStateTransition { from: ApplicationStatus, to: ApplicationStatus },

    #[error("capacity error: {0}")]
    Capacity(#[from] aqfish_accountant::CapacityError),

    #[error("store error: {0}")]
    Store(#[from] aqfish_store::StoreError),

    #[error("driver error: {0}")]
    Driver(#[from] aqfish_driver::DriverError),

    #[error("internal error: {0}")]
    Internal(String),
}
