use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver not configured: {0}")]
    NotConfigured(String),

    /// Transient failure; the caller increments the Application's retry
    /// counter and tries again (§7).
    #[error("recoverable driver error: {0}")]
    Recoverable(String),

    /// Permanent failure; the caller transitions the Application to ERROR (§7).
    #[error("fatal driver error: {0}")]
    Fatal(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}
