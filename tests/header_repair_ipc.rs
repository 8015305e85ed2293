use rusqlite::Connection;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar(workspace: &Path) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rollbookd");
    let mut child = Command::new(exe)
        .arg(workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rollbookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    payload: serde_json::Value,
) -> serde_json::Value {
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn cell(conn: &Connection, sheet: &str, row: i64, col: i64) -> String {
    conn.query_row(
        "SELECT COALESCE(
            (SELECT value FROM cells
             WHERE sheet_id = (SELECT id FROM sheets WHERE name = ?)
               AND row = ? AND col = ?),
            '')",
        rusqlite::params![sheet, row, col],
        |r| r.get(0),
    )
    .expect("query cell")
}

/// Rewrites a freshly created sheet into the legacy shape this daemon must
/// tolerate: no statistics columns, date data directly beside the id column,
/// and a wrong A1 label.
fn degrade_to_legacy_layout(workspace: &Path, sheet: &str) {
    let conn = Connection::open(workspace.join("rollbook.sqlite3")).expect("open workspace db");
    let sheet_id: String = conn
        .query_row("SELECT id FROM sheets WHERE name = ?", [sheet], |r| r.get(0))
        .expect("sheet id");
    conn.execute(
        "DELETE FROM cells WHERE sheet_id = ? AND col IN (2, 3)",
        [&sheet_id],
    )
    .expect("drop statistics columns");
    conn.execute(
        "UPDATE cells SET col = col - 2 WHERE sheet_id = ? AND col > 3",
        [&sheet_id],
    )
    .expect("shift date columns left");
    conn.execute(
        "UPDATE cells SET value = 'Id' WHERE sheet_id = ? AND row = 1 AND col = 1",
        [&sheet_id],
    )
    .expect("corrupt A1");
}

#[test]
fn legacy_sheet_is_repaired_without_losing_date_data() {
    let workspace = temp_dir("rollbookd-repair");

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let seeded = request(
        &mut stdin,
        &mut reader,
        json!({
            "command": "batch_attendance",
            "sheet_name": "Attendance",
            "records": [{ "student_id": "9", "date": "21/5", "status": "present" }]
        }),
    );
    assert_eq!(seeded["result"], "success");
    drop(stdin);
    let _ = child.wait();

    degrade_to_legacy_layout(&workspace, "Attendance");

    let (mut child, mut stdin, mut reader) = spawn_sidecar(&workspace);
    let resp = request(
        &mut stdin,
        &mut reader,
        json!({
            "command": "batch_attendance",
            "sheet_name": "Attendance",
            "records": [{ "student_id": "2", "date": "22/5", "status": "present" }]
        }),
    );
    assert_eq!(resp["result"], "success");
    drop(stdin);
    let _ = child.wait();

    let conn = Connection::open(workspace.join("rollbook.sqlite3")).expect("open workspace db");

    // Canonical headers restored, statistics pair reinserted after column 1.
    assert_eq!(cell(&conn, "Attendance", 1, 1), "Student ID");
    assert_eq!(cell(&conn, "Attendance", 1, 2), "Attended Days");
    assert_eq!(cell(&conn, "Attendance", 1, 3), "Percentage");
    assert_eq!(cell(&conn, "Attendance", 1, 4), "21/5");
    assert_eq!(cell(&conn, "Attendance", 1, 5), "22/5");

    // Rows sorted "2", "9"; the pre-repair mark survived under its label.
    assert_eq!(cell(&conn, "Attendance", 2, 1), "2");
    assert_eq!(cell(&conn, "Attendance", 2, 4), "");
    assert_eq!(cell(&conn, "Attendance", 2, 5), "present");
    assert_eq!(cell(&conn, "Attendance", 3, 1), "9");
    assert_eq!(cell(&conn, "Attendance", 3, 4), "present");
    assert_eq!(cell(&conn, "Attendance", 3, 5), "");

    // Statistics recomputed over both date columns.
    for row in [2, 3] {
        assert_eq!(cell(&conn, "Attendance", row, 2), "1");
        assert_eq!(cell(&conn, "Attendance", row, 3), "50.0%");
    }

    let _ = std::fs::remove_dir_all(workspace);
}
