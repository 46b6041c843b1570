use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use aqfish_domain::{ApplicationResource, ApplicationUid, Definition};

use crate::driver::{AllocateResult, AvailableCapacity, Driver, DriverStatus};
use crate::error::DriverError;

/// Opaque options a Label author may set per Definition (§4.4).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TestDriverOptions {
    fail_allocate: bool,
    delay_available_capacity_ms: u64,
    is_remote: bool,
}

/// An in-process stub driver that simulates resource lifecycle without any
/// real I/O.
///
/// - Produces synthetic identifiers (`test://<instance>/<n>`).
/// - Honors `fail_allocate`/`delay_available_capacity`/`is_remote` options so
///   tests can exercise retry and remote-mode paths deterministically.
#[derive(Debug)]
pub struct TestDriver {
    instance: String,
    options: RwLock<TestDriverOptions>,
    counter: AtomicU64,
}

impl TestDriver {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            options: RwLock::new(TestDriverOptions::default()),
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Driver for TestDriver {
    fn name(&self) -> &'static str {
        "test"
    }

    async fn prepare(&self, config: &serde_json::Value) -> Result<(), DriverError> {
        let parsed: TestDriverOptions = serde_json::from_value(config.clone())
            .map_err(|e| DriverError::Internal(format!("invalid test driver options: {e}")))?;
        *self.options.write().unwrap() = parsed;
        debug!(instance = %self.instance, "TestDriver: prepare");
        Ok(())
    }

    async fn available_capacity(&self, definition: &Definition) -> Result<AvailableCapacity, DriverError> {
        let delay_ms = self.options.read().unwrap().delay_available_capacity_ms;
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        let _ = definition;
        Ok(AvailableCapacity(1))
    }

    async fn validate_definition(&self, _definition: &Definition) -> Result<(), DriverError> {
        Ok(())
    }

    async fn allocate(
        &self,
        application_uid: ApplicationUid,
        _definition: &Definition,
    ) -> Result<AllocateResult, DriverError> {
        if self.options.read().unwrap().fail_allocate {
            return Err(DriverError::Recoverable(format!(
                "test driver {} configured to fail allocate",
                self.instance
            )));
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let identifier = format!("test://{}/{n}", self.instance);
        debug!(application_uid = %application_uid, %identifier, "TestDriver: allocate");
        Ok(AllocateResult {
            identifier,
            hw_addr: None,
            metadata: json!({ "driver": "test", "instance": self.instance }),
            authentication: json!({}),
        })
    }

    async fn status(&self, _resource: &ApplicationResource) -> Result<DriverStatus, DriverError> {
        Ok(DriverStatus::Running)
    }

    async fn deallocate(&self, resource: &ApplicationResource) -> Result<(), DriverError> {
        debug!(identifier = %resource.identifier, "TestDriver: deallocate");
        Ok(())
    }

    fn is_remote(&self) -> bool {
        self.options.read().unwrap().is_remote
    }
}
