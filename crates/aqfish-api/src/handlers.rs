use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use aqfish_core::CoreError;
use aqfish_domain::{
    Application, ApplicationResourceUid, ApplicationStatus, ApplicationUid, Label, LabelUid,
};

use crate::envelope::Envelope;
use crate::error::ApiError;
use crate::filter;
use crate::identity::Identity;
use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.list_nodes().await?;
    Ok(StatusCode::OK)
}

// ── Body parsing (JSON or YAML by Content-Type, §6) ─────────────────────────

fn parse_body<T: serde::de::DeserializeOwned>(headers: &HeaderMap, body: &Bytes) -> Result<T, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");
    if content_type.contains("yaml") {
        serde_yaml::from_slice(body).map_err(|e| ApiError::InvalidInput(format!("invalid YAML body: {e}")))
    } else {
        serde_json::from_slice(body).map_err(|e| ApiError::InvalidInput(format!("invalid JSON body: {e}")))
    }
}

// ── Label ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLabelBody {
    pub name: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub visible_for: Vec<String>,
    #[serde(default)]
    pub remove_at: Option<chrono::DateTime<Utc>>,
    pub definitions: Vec<aqfish_domain::Definition>,
}

pub async fn create_label(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Envelope<Label>, ApiError> {
    if !identity.has_permission("LabelService.Create") {
        return Err(ApiError::PermissionDenied);
    }
    let req: CreateLabelBody = parse_body(&headers, &body)?;

    let (version, remove_at, visible_for) = if identity.is_admin() {
        (req.version, req.remove_at, req.visible_for)
    } else {
        enforce_non_privileged_label_rules(&identity, &req, &state.config.label_remove_at_max)?
    };

    let label = Label {
        uid: LabelUid::new_derived(state.node_uid.prefix_of()),
        name: req.name,
        version,
        owner_name: identity.name().to_string(),
        visible_for,
        remove_at,
        definitions: req.definitions,
        created_at: Utc::now(),
    };
    state.store.upsert_label(&label).await?;
    Ok(Envelope::ok(label))
}

fn enforce_non_privileged_label_rules(
    identity: &Identity,
    req: &CreateLabelBody,
    max_remove_at: &std::time::Duration,
) -> Result<(i64, Option<chrono::DateTime<Utc>>, Vec<String>), ApiError> {
    if req.version != 0 {
        return Err(ApiError::InvalidInput("non-admin Labels must have version=0".into()));
    }
    let now = Utc::now();
    let lower = now + ChronoDuration::seconds(30);
    let upper = ChronoDuration::from_std(*max_remove_at)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);
    let remove_at = match req.remove_at {
        Some(r) if r >= lower && r <= upper => r,
        _ => {
            return Err(ApiError::InvalidInput(format!(
                "removeAt must be between {lower} and {upper}"
            )))
        }
    };
    if req.visible_for.is_empty() {
        return Err(ApiError::InvalidInput("non-admin Labels must set a non-empty visibleFor".into()));
    }
    let allowed: Vec<&str> = std::iter::once(identity.name()).chain(identity.groups().iter().map(String::as_str)).collect();
    if !req.visible_for.iter().all(|v| allowed.contains(&v.as_str())) {
        return Err(ApiError::InvalidInput(
            "visibleFor may only name the caller or groups the caller belongs to".into(),
        ));
    }
    Ok((0, Some(remove_at), req.visible_for.clone()))
}

pub async fn get_label(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(uid): Path<String>,
) -> Result<Envelope<Label>, ApiError> {
    let uid = parse_label_uid(&uid)?;
    let label = state
        .store
        .get_label(&uid)
        .await?
        .ok_or_else(|| ApiError::NotFound { kind: "Label", id: uid.to_string() })?;
    if !identity.can_view(&label.owner_name, &label.visible_for) {
        return Err(ApiError::PermissionDenied);
    }
    Ok(Envelope::ok(label))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
}

pub async fn list_labels(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(q): Query<ListQuery>,
) -> Result<Envelope<Vec<Label>>, ApiError> {
    let ast = q.filter.as_deref().map(filter::parse).transpose()?;
    let labels = state.store.list_labels().await?;
    let visible = labels
        .into_iter()
        .filter(|l| identity.can_view(&l.owner_name, &l.visible_for))
        .filter(|l| match &ast {
            Some(ast) => filter::eval(ast, |field| match field {
                "name" => Some(l.name.clone()),
                "ownerName" => Some(l.owner_name.clone()),
                _ => None,
            }),
            None => true,
        })
        .collect();
    Ok(Envelope::ok(visible))
}

fn parse_label_uid(raw: &str) -> Result<LabelUid, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidInput(format!("invalid Label UID: {raw}")))
}

fn parse_application_uid(raw: &str) -> Result<ApplicationUid, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidInput(format!("invalid Application UID: {raw}")))
}

// ── Application ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationBody {
    #[serde(rename = "labelUID")]
    pub label_uid: String,
    #[serde(default)]
    pub metadata: Value,
}

pub async fn create_application(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateApplicationBody>,
) -> Result<Envelope<Application>, ApiError> {
    if !identity.has_permission("ApplicationService.Create") {
        return Err(ApiError::PermissionDenied);
    }
    let label_uid = parse_label_uid(&req.label_uid)?;
    let label = state
        .store
        .get_label(&label_uid)
        .await?
        .ok_or_else(|| ApiError::NotFound { kind: "Label", id: label_uid.to_string() })?;
    if !identity.can_view(&label.owner_name, &label.visible_for) {
        return Err(ApiError::PermissionDenied);
    }

    let app = Application {
        uid: ApplicationUid::new_derived(state.node_uid.prefix_of()),
        label_uid,
        owner_name: identity.name().to_string(),
        metadata: req.metadata,
        created_at: Utc::now(),
    };
    state.store.upsert_application(&app).await?;
    state
        .mailbox
        .append_validated(&state.store, app.uid, ApplicationStatus::New, state.node_uid.prefix_of(), "created")
        .await?;
    Ok(Envelope::ok(app))
}

async fn load_application_for(
    state: &AppState,
    identity: &Identity,
    uid: ApplicationUid,
) -> Result<Application, ApiError> {
    let app = state
        .store
        .get_application(&uid)
        .await?
        .ok_or_else(|| ApiError::NotFound { kind: "Application", id: uid.to_string() })?;
    if !identity.can_view(&app.owner_name, &[]) {
        return Err(ApiError::PermissionDenied);
    }
    Ok(app)
}

pub async fn get_application_state(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(uid): Path<String>,
) -> Result<Envelope<ApplicationStatus>, ApiError> {
    let uid = parse_application_uid(&uid)?;
    load_application_for(&state, &identity, uid).await?;
    let status = state
        .store
        .current_status(&uid)
        .await?
        .ok_or_else(|| ApiError::NotFound { kind: "ApplicationState", id: uid.to_string() })?;
    Ok(Envelope::ok(status))
}

/// Idempotent per §6/P5: NEW→RECALLED, ALLOCATED→DEALLOCATE (the pickup loop
/// carries it to DEALLOCATED); any other current state is a no-op.
pub async fn deallocate_application(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(uid): Path<String>,
) -> Result<Envelope<ApplicationStatus>, ApiError> {
    let uid = parse_application_uid(&uid)?;
    let app = load_application_for(&state, &identity, uid).await?;
    let current = state
        .store
        .current_status(&uid)
        .await?
        .ok_or_else(|| ApiError::NotFound { kind: "ApplicationState", id: uid.to_string() })?;

    let next = match current {
        ApplicationStatus::New => ApplicationStatus::Recalled,
        ApplicationStatus::Allocated => ApplicationStatus::Deallocate,
        other => return Ok(Envelope::ok(other)),
    };

    // The mailbox re-reads current status under its per-Application lock, so
    // a pickup loop tick racing this request past `current` above is caught
    // here rather than silently overwritten.
    match state
        .mailbox
        .append_validated(&state.store, app.uid, next, state.node_uid.prefix_of(), "deallocate requested")
        .await
    {
        Ok(()) => Ok(Envelope::ok(next)),
        Err(CoreError::InvalidStateTransition { from, .. }) => Ok(Envelope::ok(from)),
        Err(e) => Err(e.into()),
    }
}

// ── ApplicationResource ──────────────────────────────────────────────────

pub async fn access_resource(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(uid): Path<String>,
) -> Result<Envelope<Value>, ApiError> {
    let uid = parse_application_uid(&uid)?;
    load_application_for(&state, &identity, uid).await?;
    let resource = state
        .store
        .get_application_resource(&uid)
        .await?
        .ok_or_else(|| ApiError::NotFound { kind: "ApplicationResource", id: uid.to_string() })?;
    let token = state.access_tokens.issue(resource.application_uid);
    Ok(Envelope::ok_value(json!({
        "token": token,
        "identifier": resource.identifier,
        "authentication": resource.authentication,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RedeemQuery {
    pub token: Uuid,
}

pub async fn redeem_access_token(
    State(state): State<AppState>,
    Query(q): Query<RedeemQuery>,
) -> Result<Envelope<Value>, ApiError> {
    let application_uid = state
        .access_tokens
        .redeem(q.token)
        .ok_or_else(|| ApiError::InvalidInput("access token unknown or already used".into()))?;
    Ok(Envelope::ok_value(json!({ "applicationUID": application_uid.to_string() })))
}

// ── Node ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MaintenanceQuery {
    pub enable: Option<bool>,
    pub shutdown: Option<bool>,
    pub shutdown_delay: Option<u64>,
}

pub async fn node_maintenance(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(q): Query<MaintenanceQuery>,
) -> Result<Envelope<Value>, ApiError> {
    if !identity.is_admin() {
        return Err(ApiError::PermissionDenied);
    }
    if let Some(enable) = q.enable {
        state.maintenance.set_maintenance(enable);
    }
    if let Some(shutdown) = q.shutdown {
        let delay = std::time::Duration::from_secs(q.shutdown_delay.unwrap_or(0));
        state.maintenance.request_shutdown(shutdown, delay);
    }
    Ok(Envelope::ok_value(json!({
        "maintenance": state.maintenance_flag.load(std::sync::atomic::Ordering::Relaxed),
    })))
}

pub async fn list_nodes(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
) -> Result<Envelope<Vec<aqfish_domain::Node>>, ApiError> {
    Ok(Envelope::ok(state.store.list_nodes().await?))
}

// ── User / Role ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateUserBody {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateUserBody>,
) -> Result<Envelope<crate::identity::User>, ApiError> {
    if !identity.has_permission("UserService.Create") {
        return Err(ApiError::PermissionDenied);
    }
    state
        .users
        .create_user(&req.name, &req.password, req.roles, req.groups)
        .map_err(|e| ApiError::InvalidInput(format!("failed to hash password: {e}")))?;
    let user = state
        .users
        .get(&req.name)
        .ok_or_else(|| ApiError::NotFound { kind: "User", id: req.name.clone() })?;
    Ok(Envelope::ok(user))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<Envelope<crate::identity::User>, ApiError> {
    if !identity.is_admin() && identity.name() != name {
        return Err(ApiError::PermissionDenied);
    }
    let user = state
        .users
        .get(&name)
        .ok_or_else(|| ApiError::NotFound { kind: "User", id: name })?;
    Ok(Envelope::ok(user))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Envelope<Vec<crate::identity::User>>, ApiError> {
    if !identity.is_admin() {
        return Err(ApiError::PermissionDenied);
    }
    Ok(Envelope::ok(state.users.list()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupBody {
    pub groups: Vec<String>,
}

/// `UserService.UpdateGroup` (§4.7).
pub async fn update_user_group(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
    Json(req): Json<UpdateGroupBody>,
) -> Result<Envelope<Value>, ApiError> {
    if !identity.has_permission("UserService.UpdateGroup") {
        return Err(ApiError::PermissionDenied);
    }
    if !state.users.update_groups(&name, req.groups) {
        return Err(ApiError::NotFound { kind: "User", id: name });
    }
    Ok(Envelope::ok_value(json!({ "name": name })))
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleBody {
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

pub async fn create_role(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateRoleBody>,
) -> Result<Envelope<crate::identity::Role>, ApiError> {
    if !identity.has_permission("RoleService.Create") {
        return Err(ApiError::PermissionDenied);
    }
    let role = crate::identity::Role { name: req.name, permissions: req.permissions };
    state.users.put_role(role.clone());
    Ok(Envelope::ok(role))
}

pub async fn list_roles(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Envelope<Vec<crate::identity::Role>>, ApiError> {
    if !identity.is_admin() {
        return Err(ApiError::PermissionDenied);
    }
    Ok(Envelope::ok(state.users.list_roles()))
}

// ── Status ────────────────────────────────────────────────────────────────

pub async fn status(State(state): State<AppState>) -> Result<Envelope<Value>, ApiError> {
    let applications = state.store.list_applications().await?;
    let mut by_status: HashMap<String, usize> = HashMap::new();
    for app in &applications {
        if let Some(status) = state.store.current_status(&app.uid).await? {
            *by_status.entry(status.to_string()).or_default() += 1;
        }
    }
    Ok(Envelope::ok_value(json!({
        "application_count": applications.len(),
        "by_status": by_status,
        "node_uid": state.node_uid.to_string(),
        "maintenance": state.maintenance_flag.load(std::sync::atomic::Ordering::Relaxed),
    })))
}
