use crate::ipc::error::success;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_health(state: &mut AppState, _req: &Request) -> serde_json::Value {
    success(
        "ok",
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspace_path": state.workspace.to_string_lossy(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.command.as_str() {
        "health" => Some(handle_health(state, req)),
        _ => None,
    }
}
