use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

/// One request line from the device bridge. Everything besides `command`
/// stays as raw JSON; each handler pulls the fields it needs.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(flatten)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: PathBuf,
    pub conn: Connection,
}
