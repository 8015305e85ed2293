use anyhow::Result;
use serde::Deserialize;
use serde_json::json;

use crate::grid::Grid;

pub const STUDENT_ID_HEADER: &str = "Student ID";
pub const ATTENDED_DAYS_HEADER: &str = "Attended Days";
pub const PERCENTAGE_HEADER: &str = "Percentage";

/// Sentinel written to the percentage column when the sheet has no date
/// columns yet. Distinct from "0.0%", which means zero attendance out of a
/// non-empty date set.
pub const NOT_APPLICABLE: &str = "N/A";

pub const DEFAULT_STATUS: &str = "present";

const HEADER_ROW: i64 = 1;
const FIRST_DATA_ROW: i64 = 2;

/// One attendance record as posted by the device. All fields are optional at
/// the wire level; a missing student id fails the record, missing date and
/// status fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendanceRecord {
    pub student_id: Option<String>,
    pub date: Option<String>,
    pub status: Option<String>,
}

/// Per-record result. A failed record never aborts the rest of its batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Marked {
        student_id: String,
        date: String,
    },
    Failed {
        student_id: Option<String>,
        error: String,
    },
}

impl RecordOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RecordOutcome::Marked { .. })
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RecordOutcome::Marked { student_id, date } => json!({
                "student_id": student_id,
                "date": date,
                "success": true,
            }),
            RecordOutcome::Failed { student_id, error } => json!({
                "student_id": student_id,
                "success": false,
                "error": error,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct StatColumns {
    attended_days: i64,
    percentage: i64,
}

/// Attendance sheet maintenance over an external grid.
///
/// Layout: row 1 holds headers; column 1 is the student id, the two derived
/// statistics columns sit at 2 and 3 on fresh sheets (tolerated wherever
/// found on legacy ones), and every other column is keyed by an opaque date
/// label. The resolvers re-scan the live grid on every call, so rows and
/// columns created by earlier records in a batch are visible to later ones.
pub struct AttendanceSheet<'g, G: Grid> {
    grid: &'g mut G,
}

impl<'g, G: Grid> AttendanceSheet<'g, G> {
    pub fn new(grid: &'g mut G) -> Self {
        AttendanceSheet { grid }
    }

    /// Header bootstrap for a sheet created by this call.
    pub fn initialize_headers(&mut self) -> Result<()> {
        self.grid.set_cell(HEADER_ROW, 1, STUDENT_ID_HEADER)?;
        self.grid.set_cell(HEADER_ROW, 2, ATTENDED_DAYS_HEADER)?;
        self.grid.set_cell(HEADER_ROW, 3, PERCENTAGE_HEADER)?;
        self.grid.style_header_row()?;
        self.grid.set_frozen_rows(1)?;
        Ok(())
    }

    /// Idempotent header verification for an existing sheet. Repairs a wrong
    /// A1 label, missing statistics columns, and missing freeze/styling
    /// without clearing any date column.
    pub fn ensure_headers(&mut self) -> Result<()> {
        if self.grid.cell(HEADER_ROW, 1)?.trim() != STUDENT_ID_HEADER {
            self.grid.set_cell(HEADER_ROW, 1, STUDENT_ID_HEADER)?;
        }
        self.grid.style_header_row()?;
        if self.grid.frozen_rows()? < 1 {
            self.grid.set_frozen_rows(1)?;
        }
        self.ensure_statistic_columns()?;
        Ok(())
    }

    /// Locates the two statistics columns, inserting them when absent: a
    /// missing "Attended Days" goes immediately after column 1 and a missing
    /// "Percentage" immediately after "Attended Days". Insertion shifts date
    /// columns rightward, so column identity is label-based, never
    /// positional. A pair found elsewhere is left where it is.
    fn ensure_statistic_columns(&mut self) -> Result<StatColumns> {
        let last_col = self.grid.last_column()?.max(1);
        let mut attended_days = None;
        let mut percentage = None;
        for col in 1..=last_col {
            let value = self.grid.cell(HEADER_ROW, col)?;
            let label = value.trim();
            if label == ATTENDED_DAYS_HEADER && attended_days.is_none() {
                attended_days = Some(col);
            } else if label == PERCENTAGE_HEADER && percentage.is_none() {
                percentage = Some(col);
            }
        }

        let attended_days = match attended_days {
            Some(col) => col,
            None => {
                self.grid.insert_column_after(1)?;
                if let Some(p) = percentage.as_mut() {
                    *p += 1;
                }
                self.grid.set_cell(HEADER_ROW, 2, ATTENDED_DAYS_HEADER)?;
                2
            }
        };
        let percentage = match percentage {
            Some(col) => col,
            None => {
                self.grid.insert_column_after(attended_days)?;
                let col = attended_days + 1;
                self.grid.set_cell(HEADER_ROW, col, PERCENTAGE_HEADER)?;
                col
            }
        };

        Ok(StatColumns {
            attended_days,
            percentage,
        })
    }

    /// Returns the column for a date label, appending one when no header
    /// matches. Matching trims both sides and falls back to a
    /// case-insensitive comparison; labels are otherwise opaque, so "21/5"
    /// and "5/21" are distinct columns.
    pub fn resolve_date_column(&mut self, date_label: &str) -> Result<i64> {
        let want = date_label.trim();
        let last_col = self.grid.last_column()?.max(1);
        for col in 1..=last_col {
            let value = self.grid.cell(HEADER_ROW, col)?;
            let have = value.trim();
            if have.is_empty() {
                continue;
            }
            if have == want || have.eq_ignore_ascii_case(want) {
                return Ok(col);
            }
        }
        let col = last_col + 1;
        self.grid.set_cell(HEADER_ROW, col, want)?;
        Ok(col)
    }

    /// Returns the row for a student id, appending one when no column-1 cell
    /// matches. Ids compare by exact string equality, no numeric coercion.
    pub fn resolve_student_row(&mut self, student_id: &str) -> Result<i64> {
        let last_row = self.grid.last_row()?;
        for row in FIRST_DATA_ROW..=last_row {
            if self.grid.cell(row, 1)? == student_id {
                return Ok(row);
            }
        }
        let row = last_row.max(HEADER_ROW) + 1;
        self.grid.set_cell(row, 1, student_id)?;
        Ok(row)
    }

    /// Resolves and writes one record; last write for a (row, column) pair
    /// wins. `fallback_date` fills in for a record with no usable date.
    pub fn apply_record(&mut self, record: &AttendanceRecord, fallback_date: &str) -> RecordOutcome {
        let Some(student_id) = record
            .student_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return RecordOutcome::Failed {
                student_id: record.student_id.clone(),
                error: "missing student_id".to_string(),
            };
        };
        let date = record
            .date
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback_date);
        let status = record
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_STATUS);

        match self.mark(student_id, date, status) {
            Ok(()) => RecordOutcome::Marked {
                student_id: student_id.to_string(),
                date: date.to_string(),
            },
            Err(e) => RecordOutcome::Failed {
                student_id: Some(student_id.to_string()),
                error: e.to_string(),
            },
        }
    }

    fn mark(&mut self, student_id: &str, date: &str, status: &str) -> Result<()> {
        let col = self.resolve_date_column(date)?;
        let row = self.resolve_student_row(student_id)?;
        self.grid.set_cell(row, col, status)
    }

    /// Recomputes both derived columns for every data row. Runs once per
    /// batch; cost is O(rows x date columns). Safe on a sheet with no data
    /// rows (no-op) and on one with no date columns (every row gets the
    /// "N/A" sentinel).
    pub fn recompute_statistics(&mut self) -> Result<()> {
        if self.grid.last_row()? <= HEADER_ROW {
            return Ok(());
        }

        let stats = self.ensure_statistic_columns()?;
        let last_col = self.grid.last_column()?;
        let mut date_columns = Vec::new();
        for col in 1..=last_col {
            if col == 1 || col == stats.attended_days || col == stats.percentage {
                continue;
            }
            date_columns.push(col);
        }

        let last_row = self.grid.last_row()?;
        for row in FIRST_DATA_ROW..=last_row {
            let mut attended = 0usize;
            for &col in &date_columns {
                if !self.grid.cell(row, col)?.is_empty() {
                    attended += 1;
                }
            }
            self.grid
                .set_cell(row, stats.attended_days, &attended.to_string())?;
            if date_columns.is_empty() {
                self.grid.set_cell(row, stats.percentage, NOT_APPLICABLE)?;
            } else {
                let pct = 100.0 * attended as f64 / date_columns.len() as f64;
                self.grid
                    .set_cell(row, stats.percentage, &format!("{:.1}%", pct))?;
            }
        }
        Ok(())
    }

    /// Sorts data rows ascending by student id, lexicographically. Runs
    /// after statistics so derived values travel with their row. No-op with
    /// fewer than two data rows.
    pub fn sort_by_student_id(&mut self) -> Result<()> {
        if self.grid.last_row()? <= FIRST_DATA_ROW {
            return Ok(());
        }
        self.grid.sort_range(FIRST_DATA_ROW, 1)
    }

    /// Applies a batch in input order, then recomputes statistics and sorts
    /// once. Statistics and sort failures are logged and swallowed; the
    /// per-record outcomes stand regardless.
    pub fn process_batch(
        &mut self,
        records: &[AttendanceRecord],
        fallback_date: &str,
    ) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            outcomes.push(self.apply_record(record, fallback_date));
            if i > 0 && i % 10 == 0 {
                tracing::debug!(processed = i, total = records.len(), "batch progress");
            }
        }
        if let Err(e) = self.recompute_statistics() {
            tracing::warn!(error = %e, "statistics update failed");
        }
        if let Err(e) = self.sort_by_student_id() {
            tracing::warn!(error = %e, "sort by student id failed");
        }
        outcomes
    }
}
