use crate::model::{AuditInsights, AuditReport, AuditSummary, StorageError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// One persisted audit run, without the full report body.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub id: i64,
    pub site: String,
    pub created_at: DateTime<Utc>,
    pub summary: AuditSummary,
    pub quality_score: Option<f64>,
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens the database and runs migrations.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS audit_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site TEXT NOT NULL,
                created_at TEXT NOT NULL,
                total_rows INTEGER NOT NULL,
                analyzed_rows INTEGER NOT NULL,
                skipped_rows INTEGER NOT NULL,
                duplicate_rows INTEGER NOT NULL,
                cannibalization_groups INTEGER NOT NULL,
                opportunities INTEGER NOT NULL,
                decay_alerts INTEGER NOT NULL,
                declines INTEGER NOT NULL,
                growths INTEGER NOT NULL,
                report_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS audit_insights (
                run_id INTEGER NOT NULL REFERENCES audit_runs(id),
                section TEXT NOT NULL,
                body TEXT,
                error TEXT,
                PRIMARY KEY (run_id, section)
            );
            "
        )?;

        // Columns added after the first schema; older databases get them here.
        Self::migrate_add_column_if_missing(&conn, "audit_runs", "low_ctr_pages", "INTEGER NOT NULL DEFAULT 0")?;
        Self::migrate_add_column_if_missing(&conn, "audit_runs", "zero_click_pages", "INTEGER NOT NULL DEFAULT 0")?;
        Self::migrate_add_column_if_missing(&conn, "audit_runs", "quality_score", "REAL")?;
        Self::migrate_add_column_if_missing(&conn, "audit_runs", "featured_snippets", "INTEGER NOT NULL DEFAULT 0")?;
        Self::migrate_add_column_if_missing(&conn, "audit_runs", "quick_wins", "INTEGER NOT NULL DEFAULT 0")?;
        Self::migrate_add_column_if_missing(&conn, "audit_runs", "device_gap_pages", "INTEGER NOT NULL DEFAULT 0")?;

        Ok(Self { conn })
    }

    /// Adds a column to a table unless it already exists.
    fn migrate_add_column_if_missing(
        conn: &Connection,
        table: &str,
        column: &str,
        column_def: &str,
    ) -> Result<(), StorageError> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let existing_columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        if !existing_columns.iter().any(|c| c == column) {
            let alter_sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, column_def);
            conn.execute(&alter_sql, [])?;
        }

        Ok(())
    }

    /// Stores a finished report and returns the new run id.
    pub fn save_report(&self, site: &str, report: &AuditReport) -> Result<i64, StorageError> {
        let report_json = serde_json::to_string(report)?;
        let s = &report.summary;
        self.conn.execute(
            "INSERT INTO audit_runs (
                site, created_at, total_rows, analyzed_rows, skipped_rows, duplicate_rows,
                cannibalization_groups, opportunities, decay_alerts, declines, growths,
                low_ctr_pages, zero_click_pages, quality_score, report_json,
                featured_snippets, quick_wins, device_gap_pages
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                site,
                Utc::now().to_rfc3339(),
                s.total_rows as i64,
                s.analyzed_rows as i64,
                s.skipped_rows as i64,
                s.duplicate_rows as i64,
                s.cannibalization_groups as i64,
                s.opportunities as i64,
                s.decay_alerts as i64,
                s.declines as i64,
                s.growths as i64,
                s.low_ctr_pages as i64,
                s.zero_click_pages as i64,
                report.quality.as_ref().map(|q| q.quality_score),
                report_json,
                s.featured_snippets as i64,
                s.quick_wins as i64,
                s.device_gap_pages as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Stores every insight section of a run, replacing earlier attempts.
    pub fn save_insights(&self, run_id: i64, insights: &AuditInsights) -> Result<(), StorageError> {
        for section in &insights.sections {
            self.conn.execute(
                "INSERT OR REPLACE INTO audit_insights (run_id, section, body, error)
                 VALUES (?1, ?2, ?3, ?4)",
                params![run_id, &section.name, &section.text, &section.error],
            )?;
        }
        Ok(())
    }

    /// Most recent run for a site, if any.
    pub fn last_run(&self, site: &str) -> Result<Option<StoredRun>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM audit_runs WHERE site = ?1 ORDER BY id DESC LIMIT 1",
            RUN_COLUMNS
        ))?;
        let run = stmt.query_row(params![site], Self::map_run).optional()?;
        Ok(run)
    }

    /// Latest runs across all sites, newest first.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<StoredRun>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM audit_runs ORDER BY id DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;

        let rows = stmt.query_map(params![limit as i64], Self::map_run)?;
        let mut runs = Vec::new();
        for run in rows {
            runs.push(run?);
        }
        Ok(runs)
    }

    /// Full report body of a run.
    pub fn load_report(&self, run_id: i64) -> Result<Option<AuditReport>, StorageError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT report_json FROM audit_runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Maps a row selected with `RUN_COLUMNS` into a `StoredRun`.
    fn map_run(row: &Row) -> Result<StoredRun, rusqlite::Error> {
        let created_at_str: String = row.get(2)?;
        let created_at = created_at_str.parse::<DateTime<Utc>>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let count = |idx: usize| -> Result<usize, rusqlite::Error> {
            Ok(row.get::<_, i64>(idx)? as usize)
        };

        Ok(StoredRun {
            id: row.get(0)?,
            site: row.get(1)?,
            created_at,
            summary: AuditSummary {
                total_rows: count(3)?,
                analyzed_rows: count(4)?,
                skipped_rows: count(5)?,
                duplicate_rows: count(6)?,
                cannibalization_groups: count(7)?,
                opportunities: count(8)?,
                decay_alerts: count(9)?,
                declines: count(10)?,
                growths: count(11)?,
                low_ctr_pages: count(12)?,
                zero_click_pages: count(13)?,
                featured_snippets: count(15)?,
                quick_wins: count(16)?,
                device_gap_pages: count(17)?,
            },
            quality_score: row.get(14)?,
        })
    }
}

const RUN_COLUMNS: &str = "id, site, created_at, total_rows, analyzed_rows, skipped_rows, \
    duplicate_rows, cannibalization_groups, opportunities, decay_alerts, declines, growths, \
    low_ctr_pages, zero_click_pages, quality_score, featured_snippets, quick_wins, device_gap_pages";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        DateWindow, InsightSection, TrafficTrend, TrendDirection, Volatility,
    };
    use chrono::NaiveDate;

    fn report(analyzed_rows: usize) -> AuditReport {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mid = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        AuditReport {
            window_a: DateWindow::new(start, mid),
            window_b: DateWindow::new(mid, end),
            cannibalization: Vec::new(),
            opportunities: Vec::new(),
            featured_snippets: Vec::new(),
            quick_wins: Vec::new(),
            decay: Vec::new(),
            quality: None,
            devices: None,
            trend: TrafficTrend {
                direction: TrendDirection::Stable,
                growth_rate_pct: 0.0,
                volatility: Volatility::Low,
            },
            summary: AuditSummary {
                total_rows: analyzed_rows + 2,
                analyzed_rows,
                skipped_rows: 2,
                quick_wins: 3,
                ..AuditSummary::default()
            },
            warnings: Vec::new(),
        }
    }

    #[test]
    fn saves_and_reads_back_runs() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        assert!(storage.last_run("example.com").unwrap().is_none());

        let first = storage.save_report("example.com", &report(10)).unwrap();
        let second = storage.save_report("example.com", &report(20)).unwrap();
        storage.save_report("other.org", &report(5)).unwrap();
        assert!(second > first);

        let last = storage.last_run("example.com").unwrap().unwrap();
        assert_eq!(last.id, second);
        assert_eq!(last.summary.analyzed_rows, 20);
        assert_eq!(last.summary.skipped_rows, 2);
        assert_eq!(last.quality_score, None);
        assert_eq!(last.summary.quick_wins, 3);

        let runs = storage.list_runs(2).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].site, "other.org");

        let loaded = storage.load_report(first).unwrap().unwrap();
        assert_eq!(loaded, report(10));
        assert!(storage.load_report(999).unwrap().is_none());
    }

    #[test]
    fn insights_replace_previous_attempts() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let run_id = storage.save_report("example.com", &report(1)).unwrap();

        let failed = AuditInsights {
            sections: vec![InsightSection {
                name: "executive_summary".into(),
                text: None,
                error: Some("timeout".into()),
            }],
        };
        storage.save_insights(run_id, &failed).unwrap();

        let ok = AuditInsights {
            sections: vec![InsightSection {
                name: "executive_summary".into(),
                text: Some("All good.".into()),
                error: None,
            }],
        };
        storage.save_insights(run_id, &ok).unwrap();

        let count: i64 = storage
            .conn
            .query_row("SELECT COUNT(*) FROM audit_insights WHERE run_id = ?1", params![run_id], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let (body, error): (Option<String>, Option<String>) = storage
            .conn
            .query_row(
                "SELECT body, error FROM audit_insights WHERE run_id = ?1",
                params![run_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(body.as_deref(), Some("All good."));
        assert_eq!(error, None);
    }

    #[test]
    fn reports_stored_before_newer_sections_still_load() {
        let storage = SqliteStorage::new(":memory:").unwrap();
        let mut old = serde_json::to_value(report(4)).unwrap();
        for key in ["featured_snippets", "quick_wins", "devices"] {
            old.as_object_mut().unwrap().remove(key);
        }
        storage
            .conn
            .execute(
                "INSERT INTO audit_runs (site, created_at, total_rows, analyzed_rows, skipped_rows,
                    duplicate_rows, cannibalization_groups, opportunities, decay_alerts, declines,
                    growths, report_json)
                 VALUES ('example.com', ?1, 6, 4, 2, 0, 0, 0, 0, 0, 0, ?2)",
                params![Utc::now().to_rfc3339(), old.to_string()],
            )
            .unwrap();

        let run = storage.last_run("example.com").unwrap().unwrap();
        assert_eq!(run.summary.featured_snippets, 0);
        let loaded = storage.load_report(run.id).unwrap().unwrap();
        assert!(loaded.featured_snippets.is_empty());
        assert!(loaded.devices.is_none());
        assert_eq!(loaded.summary, report(4).summary);
    }
}
