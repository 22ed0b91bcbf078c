//! Audit logging for access-control operations
//!
//! Every grant and revoke is appended to a JSON-lines log so that who had
//! which egress route when can be reconstructed later. Audit failures are
//! logged and swallowed: a full disk must not take the portal down.
//!
//! The log lives under the XDG state directory; `WLT_STATE_DIR` overrides
//! the location (used by the tests).

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Types of auditable events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Grant,
    Revoke,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Type of event
    pub event_type: EventType,

    /// Client the operation targeted
    pub ip: IpAddr,

    /// Whether the operation succeeded
    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,
}

impl AuditEvent {
    pub fn new(event_type: EventType, ip: IpAddr, success: bool, details: serde_json::Value) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            ip,
            success,
            details,
        }
    }
}

fn state_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("WLT_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    ProjectDirs::from("com", "wlt", "wlt")
        .and_then(|pd| pd.state_dir().map(std::path::Path::to_path_buf))
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Creates a new audit log instance, creating the state directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the state directory cannot be determined or created.
    pub fn new() -> std::io::Result<Self> {
        let dir = state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "state directory not found")
        })?;
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            log_path: dir.join("audit.log"),
        })
    }

    /// Appends an event as one JSON object per line.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file cannot be opened or written.
    pub async fn log(&self, event: AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(&event)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        Ok(())
    }
}

/// Opens the audit log, logging and swallowing setup failures.
fn open_log() -> Option<AuditLog> {
    match AuditLog::new() {
        Ok(audit) => Some(audit),
        Err(e) => {
            tracing::warn!("failed to open audit log: {e}");
            None
        }
    }
}

/// Logs a grant operation
pub async fn log_grant(ip: IpAddr, mark: u32, hours: u32, label: &str, success: bool) {
    if let Some(audit) = open_log() {
        let event = AuditEvent::new(
            EventType::Grant,
            ip,
            success,
            serde_json::json!({
                "mark": mark,
                "hours": hours,
                "label": label,
            }),
        );

        if let Err(e) = audit.log(event).await {
            tracing::warn!("failed to write audit log: {e}");
        }
    }
}

/// Logs a revoke operation
pub async fn log_revoke(ip: IpAddr, success: bool) {
    if let Some(audit) = open_log() {
        let event = AuditEvent::new(EventType::Revoke, ip, success, serde_json::json!({}));

        if let Err(e) = audit.log(event).await {
            tracing::warn!("failed to write audit log: {e}");
        }
    }
}
