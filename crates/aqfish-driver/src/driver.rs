use async_trait::async_trait;

use aqfish_domain::{ApplicationResource, ApplicationUid, Definition};

use crate::error::DriverError;

/// `Driver::available_capacity` result. Zero means the driver cannot host
/// this definition right now; any other value is an opaque score the
/// election coordinator folds into its Vote (§4.2, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailableCapacity(pub u32);

impl AvailableCapacity {
    pub const NONE: AvailableCapacity = AvailableCapacity(0);

    pub fn is_available(&self) -> bool {
        self.0 > 0
    }
}

/// Result of a successful `Allocate` call (§4.4).
#[derive(Debug, Clone)]
pub struct AllocateResult {
    /// Driver-assigned identifier for the new resource (VM id, container id, ...).
    pub identifier: String,
    pub hw_addr: Option<String>,
    pub metadata: serde_json::Value,
    pub authentication: serde_json::Value,
}

/// Status of a previously allocated resource, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Running,
    Stopped,
    Gone,
}

#[async_trait]
pub trait Driver: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One-time setup at process start; `config` is the driver's opaque
    /// `options` value from its configuration entry.
    async fn prepare(&self, config: &serde_json::Value) -> Result<(), DriverError>;

    /// Zero means this driver cannot host `definition` right now.
    async fn available_capacity(&self, definition: &Definition) -> Result<AvailableCapacity, DriverError>;

    /// Pre-flight check run when a Label is authored, independent of any Application.
    async fn validate_definition(&self, definition: &Definition) -> Result<(), DriverError>;

    /// Create (or resume provisioning) a Resource for `application_uid`. May
    /// fail recoverably; the caller retries up to the configured limit (§7).
    async fn allocate(
        &self,
        application_uid: ApplicationUid,
        definition: &Definition,
    ) -> Result<AllocateResult, DriverError>;

    async fn status(&self, resource: &ApplicationResource) -> Result<DriverStatus, DriverError>;

    /// Idempotent: calling this on an already-gone resource succeeds (P5).
    async fn deallocate(&self, resource: &ApplicationResource) -> Result<(), DriverError>;

    /// Remote-mode drivers participate in elections without enforcing local
    /// CPU/RAM quotas (§4.4).
    fn is_remote(&self) -> bool;
}
