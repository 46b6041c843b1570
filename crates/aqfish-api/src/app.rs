use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use aqfish_config::Config;
use aqfish_core::{ApplicationMailbox, MaintenanceController};
use aqfish_domain::NodeUid;
use aqfish_driver::DriverRegistry;
use aqfish_store::StateStore;

use crate::access_token::AccessTokenStore;
use crate::auth::authenticate;
use crate::handlers;
use crate::identity::UserStore;
use crate::ratelimit::RateLimiter;
use crate::state::AppState;

pub fn build_app(
    store: Arc<dyn StateStore>,
    registry: Arc<DriverRegistry>,
    config: Arc<Config>,
    node_uid: NodeUid,
    users: Arc<UserStore>,
    maintenance: Arc<MaintenanceController>,
    maintenance_flag: Arc<AtomicBool>,
    mailbox: Arc<ApplicationMailbox>,
) -> Router {
    let state = AppState {
        store,
        registry,
        config,
        node_uid,
        users,
        rate_limiter: Arc::new(RateLimiter::new()),
        access_tokens: Arc::new(AccessTokenStore::new()),
        maintenance,
        maintenance_flag,
        mailbox,
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/api/v1/labels", post(handlers::create_label).get(handlers::list_labels))
        .route("/api/v1/labels/:uid", get(handlers::get_label))
        .route("/api/v1/applications", post(handlers::create_application))
        .route("/api/v1/applications/:uid/state", get(handlers::get_application_state))
        .route("/api/v1/applications/:uid/deallocate", get(handlers::deallocate_application))
        .route("/api/v1/resources/:uid/access", get(handlers::access_resource))
        .route("/api/v1/resources/access/redeem", get(handlers::redeem_access_token))
        .route("/api/v1/nodes", get(handlers::list_nodes))
        .route("/api/v1/node/this/maintenance", put(handlers::node_maintenance))
        .route("/api/v1/users", post(handlers::create_user).get(handlers::list_users))
        .route("/api/v1/users/:name", get(handlers::get_user))
        .route("/api/v1/users/:name/groups", put(handlers::update_user_group))
        .route("/api/v1/roles", post(handlers::create_role).get(handlers::list_roles))
        .route("/api/v1/status", get(handlers::status))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
