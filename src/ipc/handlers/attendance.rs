use crate::db;
use crate::grid::SqliteGrid;
use crate::ipc::error::{error_response, success};
use crate::ipc::types::{AppState, Request};
use crate::sheet::{AttendanceRecord, AttendanceSheet, RecordOutcome};
use serde_json::json;

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
        .ok_or_else(|| format!("missing {}", key))
}

/// Fallback date for records that omit one. MM/dd/yyyy, matching what the
/// device sends when it has a clock fix.
fn today_label() -> String {
    chrono::Local::now().format("%m/%d/%Y").to_string()
}

fn parse_records(params: &serde_json::Value) -> Result<Vec<AttendanceRecord>, String> {
    let records: Vec<AttendanceRecord> = params
        .get("records")
        .cloned()
        .and_then(|raw| serde_json::from_value(raw).ok())
        .ok_or_else(|| "No valid records provided".to_string())?;
    if records.is_empty() {
        return Err("No valid records provided".to_string());
    }
    Ok(records)
}

/// Shared pipeline for both attendance commands: open the sheet once, apply
/// every record in input order, then recompute statistics and sort.
fn run_pipeline(
    state: &mut AppState,
    sheet_name: &str,
    records: &[AttendanceRecord],
) -> anyhow::Result<Vec<RecordOutcome>> {
    let (sheet_id, created) = db::find_or_create_sheet(&state.conn, sheet_name)?;
    let mut grid = SqliteGrid::new(&state.conn, sheet_id);
    let mut sheet = AttendanceSheet::new(&mut grid);
    if created {
        tracing::info!(sheet = sheet_name, "created new sheet");
        sheet.initialize_headers()?;
    } else {
        sheet.ensure_headers()?;
    }
    Ok(sheet.process_batch(records, &today_label()))
}

fn batch_attendance(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, String> {
    let sheet_name = get_required_str(params, "sheet_name")?;
    let records = parse_records(params)?;
    tracing::info!(
        sheet = %sheet_name,
        records = records.len(),
        "processing attendance batch"
    );

    let outcomes = run_pipeline(state, &sheet_name, &records).map_err(|e| e.to_string())?;
    let details: Vec<serde_json::Value> = outcomes.iter().map(RecordOutcome::to_json).collect();

    Ok(success(
        format!("Successfully processed {} attendance records", records.len()),
        json!({ "details": details }),
    ))
}

fn column_attendance(
    state: &mut AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, String> {
    let sheet_name = get_required_str(params, "sheet_name")?;
    let record: AttendanceRecord = serde_json::from_value(params.clone())
        .map_err(|e| format!("bad attendance record: {}", e))?;

    let outcomes = run_pipeline(state, &sheet_name, std::slice::from_ref(&record))
        .map_err(|e| e.to_string())?;
    match outcomes.into_iter().next() {
        Some(RecordOutcome::Marked { student_id, date }) => Ok(success(
            format!("Attendance marked for student ID {} on {}", student_id, date),
            json!({ "student_id": student_id, "date": date }),
        )),
        Some(RecordOutcome::Failed { error, .. }) => Err(error),
        None => Err("record was not processed".to_string()),
    }
}

fn handle_batch_attendance(state: &mut AppState, req: &Request) -> serde_json::Value {
    match batch_attendance(state, &req.params) {
        Ok(resp) => resp,
        Err(message) => error_response(message),
    }
}

fn handle_column_attendance(state: &mut AppState, req: &Request) -> serde_json::Value {
    match column_attendance(state, &req.params) {
        Ok(resp) => resp,
        Err(message) => error_response(message),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.command.as_str() {
        "column_attendance" => Some(handle_column_attendance(state, req)),
        "batch_attendance" => Some(handle_batch_attendance(state, req)),
        // Retired device firmware still probes this; point it at the
        // column-based flow without touching any sheet.
        "mark_attendance" => Some(error_response("Using old attendance system")),
        _ => None,
    }
}
