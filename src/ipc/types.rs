use rusqlite::Connection;
use serde::Deserialize;
use std::path::PathBuf;

/// One JSON line from the front end.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Sidecar session: the selected workspace and its open database.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Run id of the last consolidation completed in this session.
    pub last_run_id: Option<String>,
}
