use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use aqfish_config::Config;
use aqfish_core::{ApplicationMailbox, MaintenanceController};
use aqfish_driver::DriverRegistry;
use aqfish_domain::NodeUid;
use aqfish_store::StateStore;

use crate::access_token::AccessTokenStore;
use crate::identity::UserStore;
use crate::ratelimit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub registry: Arc<DriverRegistry>,
    pub config: Arc<Config>,
    pub node_uid: NodeUid,
    pub users: Arc<UserStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub access_tokens: Arc<AccessTokenStore>,
    pub maintenance: Arc<MaintenanceController>,
    pub maintenance_flag: Arc<AtomicBool>,
    /// Shared with the node's `PickupLoop` so a client-triggered deallocate
    /// and the pickup loop's own tick serialize through the same per
    /// Application lock (§5).
    pub mailbox: Arc<ApplicationMailbox>,
}
