use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;

/// Everything the attendance-sheet logic needs from its backing store.
/// Rows and columns are 1-indexed; row 1 is the header row. A cell that has
/// never been written reads back as the empty string.
pub trait Grid {
    fn last_row(&self) -> Result<i64>;
    fn last_column(&self) -> Result<i64>;
    fn cell(&self, row: i64, col: i64) -> Result<String>;
    fn set_cell(&mut self, row: i64, col: i64, value: &str) -> Result<()>;
    /// Shifts every column to the right of `col` one position rightward,
    /// leaving a blank column at `col + 1`. Cell data moves with its column.
    fn insert_column_after(&mut self, col: i64) -> Result<()>;
    fn frozen_rows(&self) -> Result<i64>;
    fn set_frozen_rows(&mut self, rows: i64) -> Result<()>;
    /// Cosmetic header highlight; carries no semantics.
    fn style_header_row(&mut self) -> Result<()>;
    /// Stable ascending sort of rows `first_row..=last_row` by the key
    /// column's string value. Whole rows move together.
    fn sort_range(&mut self, first_row: i64, key_col: i64) -> Result<()>;
}

/// Grid persisted in the workspace database, one `cells` record per written
/// cell, keyed (sheet_id, row, col).
pub struct SqliteGrid<'c> {
    conn: &'c Connection,
    sheet_id: String,
}

impl<'c> SqliteGrid<'c> {
    pub fn new(conn: &'c Connection, sheet_id: impl Into<String>) -> Self {
        SqliteGrid {
            conn,
            sheet_id: sheet_id.into(),
        }
    }
}

impl Grid for SqliteGrid<'_> {
    fn last_row(&self) -> Result<i64> {
        let n = self.conn.query_row(
            "SELECT COALESCE(MAX(row), 0) FROM cells WHERE sheet_id = ?",
            [&self.sheet_id],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    fn last_column(&self) -> Result<i64> {
        let n = self.conn.query_row(
            "SELECT COALESCE(MAX(col), 0) FROM cells WHERE sheet_id = ?",
            [&self.sheet_id],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    fn cell(&self, row: i64, col: i64) -> Result<String> {
        let v: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM cells WHERE sheet_id = ? AND row = ? AND col = ?",
                (&self.sheet_id, row, col),
                |r| r.get(0),
            )
            .optional()?;
        Ok(v.unwrap_or_default())
    }

    fn set_cell(&mut self, row: i64, col: i64, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO cells(sheet_id, row, col, value)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(sheet_id, row, col) DO UPDATE SET
               value = excluded.value",
            (&self.sheet_id, row, col, value),
        )?;
        Ok(())
    }

    fn insert_column_after(&mut self, col: i64) -> Result<()> {
        // Sign-flip two-step: a plain `col = col + 1` can collide with a
        // not-yet-shifted neighbour under the (sheet, row, col) unique key.
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE cells SET col = -(col + 1) WHERE sheet_id = ? AND col > ?",
            (&self.sheet_id, col),
        )?;
        tx.execute(
            "UPDATE cells SET col = -col WHERE sheet_id = ? AND col < 0",
            [&self.sheet_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn frozen_rows(&self) -> Result<i64> {
        let n = self.conn.query_row(
            "SELECT frozen_rows FROM sheets WHERE id = ?",
            [&self.sheet_id],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    fn set_frozen_rows(&mut self, rows: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE sheets SET frozen_rows = ? WHERE id = ?",
            (rows, &self.sheet_id),
        )?;
        Ok(())
    }

    fn style_header_row(&mut self) -> Result<()> {
        self.conn.execute(
            "UPDATE sheets SET header_styled = 1 WHERE id = ?",
            [&self.sheet_id],
        )?;
        Ok(())
    }

    fn sort_range(&mut self, first_row: i64, key_col: i64) -> Result<()> {
        let last_row = self.last_row()?;
        if last_row <= first_row {
            return Ok(());
        }

        let mut by_row: BTreeMap<i64, Vec<(i64, String)>> = BTreeMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT row, col, value FROM cells
                 WHERE sheet_id = ? AND row >= ?
                 ORDER BY row, col",
            )?;
            let iter = stmt.query_map((&self.sheet_id, first_row), |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, i64>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })?;
            for item in iter {
                let (row, col, value) = item?;
                by_row.entry(row).or_default().push((col, value));
            }
        }

        let mut rows: Vec<(String, Vec<(i64, String)>)> = (first_row..=last_row)
            .map(|r| {
                let cells = by_row.remove(&r).unwrap_or_default();
                let key = cells
                    .iter()
                    .find(|(c, _)| *c == key_col)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_default();
                (key, cells)
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM cells WHERE sheet_id = ? AND row >= ?",
            (&self.sheet_id, first_row),
        )?;
        for (offset, (_, cells)) in rows.iter().enumerate() {
            let row = first_row + offset as i64;
            for (col, value) in cells {
                tx.execute(
                    "INSERT INTO cells(sheet_id, row, col, value) VALUES(?, ?, ?, ?)",
                    (&self.sheet_id, row, col, value),
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// In-memory grid for exercising the sheet logic without a workspace.
#[cfg(test)]
pub mod mem {
    use super::Grid;
    use anyhow::Result;

    #[derive(Debug, Default)]
    pub struct MemGrid {
        rows: Vec<Vec<String>>,
        frozen_rows: i64,
        pub header_styled: bool,
    }

    impl MemGrid {
        pub fn new() -> Self {
            MemGrid::default()
        }

        fn cell_ref(row: &[String], col: i64) -> &str {
            row.get((col - 1) as usize).map(String::as_str).unwrap_or("")
        }
    }

    impl Grid for MemGrid {
        fn last_row(&self) -> Result<i64> {
            Ok(self.rows.len() as i64)
        }

        fn last_column(&self) -> Result<i64> {
            Ok(self.rows.iter().map(|r| r.len()).max().unwrap_or(0) as i64)
        }

        fn cell(&self, row: i64, col: i64) -> Result<String> {
            let v = self
                .rows
                .get((row - 1) as usize)
                .map(|r| Self::cell_ref(r, col).to_string())
                .unwrap_or_default();
            Ok(v)
        }

        fn set_cell(&mut self, row: i64, col: i64, value: &str) -> Result<()> {
            let (row, col) = ((row - 1) as usize, (col - 1) as usize);
            if self.rows.len() <= row {
                self.rows.resize_with(row + 1, Vec::new);
            }
            let cells = &mut self.rows[row];
            if cells.len() <= col {
                cells.resize_with(col + 1, String::new);
            }
            cells[col] = value.to_string();
            Ok(())
        }

        fn insert_column_after(&mut self, col: i64) -> Result<()> {
            let at = col as usize;
            for row in &mut self.rows {
                if row.len() > at {
                    row.insert(at, String::new());
                }
            }
            Ok(())
        }

        fn frozen_rows(&self) -> Result<i64> {
            Ok(self.frozen_rows)
        }

        fn set_frozen_rows(&mut self, rows: i64) -> Result<()> {
            self.frozen_rows = rows;
            Ok(())
        }

        fn style_header_row(&mut self) -> Result<()> {
            self.header_styled = true;
            Ok(())
        }

        fn sort_range(&mut self, first_row: i64, key_col: i64) -> Result<()> {
            let start = (first_row - 1) as usize;
            if self.rows.len() <= start {
                return Ok(());
            }
            self.rows[start..].sort_by(|a, b| {
                MemGrid::cell_ref(a, key_col).cmp(MemGrid::cell_ref(b, key_col))
            });
            Ok(())
        }
    }
}
