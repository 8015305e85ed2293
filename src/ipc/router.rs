use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::error_response;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &req) {
        return resp;
    }

    error_response("Invalid command")
}
