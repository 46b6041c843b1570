use aqfish_domain::{Label, Node};

/// Render a list of Labels as a fixed-width table.
pub fn render_labels(labels: &[Label]) -> String {
    if labels.is_empty() {
        return "No labels.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!("{:<38} {:<20} {:<8} {:<16}\n", "UID", "NAME", "VERSION", "OWNER"));
    out.push_str(&"-".repeat(90));
    out.push('\n');
    for label in labels {
        out.push_str(&format!(
            "{:<38} {:<20} {:<8} {:<16}\n",
            label.uid, label.name, label.version, label.owner_name
        ));
    }
    out
}

/// Render a list of Nodes as a fixed-width table.
pub fn render_nodes(nodes: &[Node]) -> String {
    if nodes.is_empty() {
        return "No nodes.\n".to_string();
    }
    let mut out = String::new();
    out.push_str(&format!(
        "{:<38} {:<16} {:<24} {:<12} {}\n",
        "UID", "NAME", "ADDRESS", "MAINTENANCE", "SHUTDOWN_PENDING"
    ));
    out.push_str(&"-".repeat(100));
    out.push('\n');
    for node in nodes {
        out.push_str(&format!(
            "{:<38} {:<16} {:<24} {:<12} {}\n",
            node.uid,
            node.name,
            node.address.as_deref().unwrap_or("-"),
            node.maintenance,
            node.shutdown_pending,
        ));
    }
    out
}
