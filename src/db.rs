use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("rollbook.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sheets(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            frozen_rows INTEGER NOT NULL DEFAULT 0,
            header_styled INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS cells(
            sheet_id TEXT NOT NULL,
            row INTEGER NOT NULL,
            col INTEGER NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY(sheet_id, row, col),
            FOREIGN KEY(sheet_id) REFERENCES sheets(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cells_sheet_col ON cells(sheet_id, col)",
        [],
    )?;

    Ok(())
}

pub fn find_sheet(conn: &Connection, name: &str) -> anyhow::Result<Option<String>> {
    let id = conn
        .query_row("SELECT id FROM sheets WHERE name = ?", [name], |r| {
            r.get::<_, String>(0)
        })
        .optional()?;
    Ok(id)
}

pub fn create_sheet(conn: &Connection, name: &str) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO sheets(id, name) VALUES(?, ?)", (&id, name))?;
    Ok(id)
}

/// Returns the sheet id and whether this call created the sheet.
pub fn find_or_create_sheet(conn: &Connection, name: &str) -> anyhow::Result<(String, bool)> {
    if let Some(id) = find_sheet(conn, name)? {
        return Ok((id, false));
    }
    let id = create_sheet(conn, name)?;
    Ok((id, true))
}
