mod error;
mod handlers;
mod router;
mod types;

pub use error::error_response;
pub use router::handle_request;
pub use types::{AppState, Request};
