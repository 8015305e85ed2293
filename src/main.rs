mod db;
mod grid;
mod ipc;
mod sheet;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn init_logging() {
    // stdout carries protocol responses, so logs go to stderr.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rollbookd=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let workspace = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let conn = db::open_db(&workspace)?;
    tracing::info!(workspace = %workspace.display(), "rollbookd ready");

    let mut state = ipc::AppState { workspace, conn };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let resp = ipc::error_response(format!("bad request: {}", e));
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"result\":\"error\"}".to_string())
        );
        let _ = stdout.flush();
    }

    Ok(())
}
