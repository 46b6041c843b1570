use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use aqfish_api::identity::UserStore;
use aqfish_cluster::{build_cluster_router, PeerRegistry};
use aqfish_core::{ApplicationMailbox, CleanupSweeper, MaintenanceController, PickupLoop};
use aqfish_domain::{Node, NodeCapacity, NodeUid};
use aqfish_driver::{Driver, DriverRegistry, TestDriver};
use aqfish_store::{InMemoryStore, RedbStore, StateStore};

use crate::cli::{ApplicationCommand, LabelCommand, NodeCommand};
use crate::output;

// ── Serve ─────────────────────────────────────────────────────────────────────

pub async fn serve(
    config_path: PathBuf,
    ephemeral: bool,
    store_path: Option<PathBuf>,
    auto_connect_cap: usize,
    admin_password: Option<String>,
) -> Result<()> {
    let config = Arc::new(
        aqfish_config::load_config(&config_path)
            .with_context(|| format!("failed to load config at {}", config_path.display()))?,
    );

    let store: Arc<dyn StateStore> = if ephemeral {
        println!("Using in-memory (ephemeral) store — state will be lost on restart");
        Arc::new(InMemoryStore::new())
    } else {
        let path = resolve_store_path(store_path, &config.node_name);
        println!("Using persistent store at {}", path.display());
        Arc::new(
            RedbStore::open(&path)
                .with_context(|| format!("failed to open store at {}", path.display()))?,
        )
    };

    let node_uid = NodeUid::new_root();
    let node_pubkey = Uuid::new_v4().as_bytes().to_vec();
    let mut registry = DriverRegistry::new();
    for (name, cfg) in config.drivers.gates.iter().chain(config.drivers.providers.iter()) {
        let driver = TestDriver::new(name.clone());
        driver
            .prepare(&serde_json::json!({
                "fail_allocate": cfg.fail_allocate,
                "delay_available_capacity_ms": cfg.delay_available_capacity.map(|d| d.as_millis() as u64).unwrap_or(0),
                "is_remote": cfg.is_remote,
            }))
            .await
            .with_context(|| format!("failed to prepare driver '{name}'"))?;
        registry.register(name.clone(), Arc::new(driver));
    }
    let registry = Arc::new(registry);

    let node = Node {
        uid: node_uid,
        name: config.node_name.clone(),
        location: config.node_location.clone(),
        pubkey: node_pubkey.clone(),
        address: Some(format!("http://{}", config.api_address)),
        capacity: NodeCapacity {
            cpu_limit: config.cpu_limit,
            ram_limit: config.mem_target,
            node_slots_limit: config.node_slots_limit,
        },
        maintenance: false,
        shutdown_pending: false,
        created_at: chrono::Utc::now(),
    };
    store.upsert_node(&node).await.context("failed to register this node")?;

    let peers = Arc::new(PeerRegistry::new(config.cluster_auto, auto_connect_cap));
    let maintenance_flag = Arc::new(AtomicBool::new(false));
    let maintenance = Arc::new(MaintenanceController::new(store.clone(), node_uid, maintenance_flag.clone()));

    let admin_password = admin_password.unwrap_or_else(|| Uuid::new_v4().to_string());
    let users = Arc::new(UserStore::with_bootstrap_admin(&admin_password));
    println!("Bootstrap admin password: {admin_password}");

    let mailbox = Arc::new(ApplicationMailbox::new());
    let pickup = Arc::new(PickupLoop::new(store.clone(), registry.clone(), &config, node_uid, maintenance_flag.clone(), mailbox.clone()));
    let sweeper = Arc::new(CleanupSweeper::new(store.clone(), config.db_cleanup_interval, config.cleanup_startup_grace));
    tokio::spawn(aqfish_core::supervisor::run(pickup, maintenance.clone(), sweeper));

    let api_router = aqfish_api::build_app(
        store.clone(),
        registry,
        config.clone(),
        node_uid,
        users,
        maintenance,
        maintenance_flag,
        mailbox.clone(),
    );
    let cluster_router = build_cluster_router(store, peers, mailbox, node_uid, node_pubkey);
    let app = api_router.merge(cluster_router);

    println!(
        "Node '{}' ({}) listening on {} — drivers: {}",
        config.node_name,
        node_uid,
        config.api_address,
        registry_summary(&config),
    );
    let listener = tokio::net::TcpListener::bind(&config.api_address)
        .await
        .with_context(|| format!("failed to bind to {}", config.api_address))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn registry_summary(config: &aqfish_config::Config) -> String {
    let mut keys: Vec<&String> = config.drivers.gates.keys().chain(config.drivers.providers.keys()).collect();
    keys.sort();
    if keys.is_empty() {
        "(none)".to_string()
    } else {
        keys.into_iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

fn resolve_store_path(explicit: Option<PathBuf>, node_name: &str) -> PathBuf {
    if let Some(p) = explicit {
        return p;
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".aqfish").join(format!("{node_name}.redb"))
}

// ── Remote client helpers ────────────────────────────────────────────────────

fn authed_client(user: &str, password: &str) -> Result<reqwest::Client> {
    use base64::Engine as _;
    let mut headers = reqwest::header::HeaderMap::new();
    let credentials = format!("{user}:{password}");
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
    headers.insert(
        reqwest::header::AUTHORIZATION,
        reqwest::header::HeaderValue::from_str(&format!("Basic {encoded}"))
            .context("user/password contain invalid header characters")?,
    );
    Ok(reqwest::Client::builder().default_headers(headers).build()?)
}

fn require_password(password: Option<String>) -> Result<String> {
    password.context("--password (or AQFISH_PASSWORD) is required for remote commands")
}

fn base(remote: &str) -> String {
    format!("{}/api/v1", remote.trim_end_matches('/'))
}

// ── Label ─────────────────────────────────────────────────────────────────────

pub async fn label(command: LabelCommand, remote: String, user: String, password: Option<String>) -> Result<()> {
    let password = require_password(password)?;
    let client = authed_client(&user, &password)?;
    let base = base(&remote);

    match command {
        LabelCommand::Create { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let is_yaml = matches!(file.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"));
            let content_type = if is_yaml { "application/yaml" } else { "application/json" };
            let resp = client
                .post(format!("{base}/labels"))
                .header("content-type", content_type)
                .body(content)
                .send()
                .await
                .with_context(|| format!("failed to reach {remote}"))?;
            print_envelope(resp).await
        }
        LabelCommand::List { filter } => {
            let mut req = client.get(format!("{base}/labels"));
            if let Some(filter) = filter {
                req = req.query(&[("filter", filter)]);
            }
            let resp = req.send().await.with_context(|| format!("failed to reach {remote}"))?;
            let envelope: serde_json::Value = resp.json().await.context("failed to parse response")?;
            let labels: Vec<aqfish_domain::Label> =
                serde_json::from_value(envelope["data"].clone()).context("failed to parse labels")?;
            print!("{}", output::render_labels(&labels));
            Ok(())
        }
        LabelCommand::Get { uid } => {
            let resp = client.get(format!("{base}/labels/{uid}")).send().await.with_context(|| format!("failed to reach {remote}"))?;
            print_envelope(resp).await
        }
    }
}

// ── Application ───────────────────────────────────────────────────────────────

pub async fn application(command: ApplicationCommand, remote: String, user: String, password: Option<String>) -> Result<()> {
    let password = require_password(password)?;
    let client = authed_client(&user, &password)?;
    let base = base(&remote);

    match command {
        ApplicationCommand::Create { label_uid, metadata } => {
            let metadata = match metadata {
                Some(raw) => serde_json::from_str(&raw).context("--metadata must be valid JSON")?,
                None => serde_json::Value::Null,
            };
            let body = serde_json::json!({ "labelUID": label_uid, "metadata": metadata });
            let resp = client
                .post(format!("{base}/applications"))
                .json(&body)
                .send()
                .await
                .with_context(|| format!("failed to reach {remote}"))?;
            print_envelope(resp).await
        }
        ApplicationCommand::Get { uid } => {
            let resp = client
                .get(format!("{base}/applications/{uid}/state"))
                .send()
                .await
                .with_context(|| format!("failed to reach {remote}"))?;
            print_envelope(resp).await
        }
        ApplicationCommand::Deallocate { uid } => {
            let resp = client
                .get(format!("{base}/applications/{uid}/deallocate"))
                .send()
                .await
                .with_context(|| format!("failed to reach {remote}"))?;
            print_envelope(resp).await
        }
        ApplicationCommand::Access { uid } => {
            let resp = client
                .get(format!("{base}/resources/{uid}/access"))
                .send()
                .await
                .with_context(|| format!("failed to reach {remote}"))?;
            print_envelope(resp).await
        }
    }
}

// ── Node ──────────────────────────────────────────────────────────────────────

pub async fn node(command: NodeCommand, remote: String, user: String, password: Option<String>) -> Result<()> {
    let password = require_password(password)?;
    let client = authed_client(&user, &password)?;
    let base = base(&remote);

    match command {
        NodeCommand::List => {
            let resp = client.get(format!("{base}/nodes")).send().await.with_context(|| format!("failed to reach {remote}"))?;
            let envelope: serde_json::Value = resp.json().await.context("failed to parse response")?;
            let nodes: Vec<Node> = serde_json::from_value(envelope["data"].clone()).context("failed to parse nodes")?;
            print!("{}", output::render_nodes(&nodes));
            Ok(())
        }
        NodeCommand::Maintenance { enable, shutdown, shutdown_delay_secs } => {
            let mut query = Vec::new();
            if let Some(enable) = enable {
                query.push(("enable".to_string(), enable.to_string()));
            }
            if let Some(shutdown) = shutdown {
                query.push(("shutdown".to_string(), shutdown.to_string()));
                query.push(("shutdown_delay".to_string(), shutdown_delay_secs.to_string()));
            }
            let resp = client
                .put(format!("{base}/node/this/maintenance"))
                .query(&query)
                .send()
                .await
                .with_context(|| format!("failed to reach {remote}"))?;
            print_envelope(resp).await
        }
    }
}

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status(remote: String, user: String, password: Option<String>) -> Result<()> {
    let password = require_password(password)?;
    let client = authed_client(&user, &password)?;
    let resp = client
        .get(format!("{}/status", base(&remote)))
        .send()
        .await
        .with_context(|| format!("failed to reach {remote}"))?;
    print_envelope(resp).await
}

async fn print_envelope(resp: reqwest::Response) -> Result<()> {
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
    println!("{}", serde_json::to_string_pretty(&body)?);
    if !status.is_success() {
        anyhow::bail!("request failed: {status}");
    }
    Ok(())
}
