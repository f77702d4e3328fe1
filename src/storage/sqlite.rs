use crate::model::{
    AnalysisResult, AnalysisStatus, ChangeKind, FrequencyBin, MarketIndex, StorageError,
};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Summary row of a stored analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRun {
    pub id: i64,
    pub index: String,
    pub change_kind: String,
    pub as_of: NaiveDate,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub count: usize,
    pub mean: f64,
    pub stdev: f64,
    pub status: String,
}

impl StoredRun {
    pub fn is_degenerate(&self) -> bool {
        self.status == AnalysisStatus::Degenerate.label()
    }
}

/// Report store for batch runs: one row per analysis plus its table and z-score series.
pub struct SqliteReportStore {
    conn: Connection,
}

impl SqliteReportStore {
    /// Opens the database and creates the schema if needed.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS analysis_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market_index TEXT NOT NULL,
                change_kind TEXT NOT NULL,
                as_of TEXT NOT NULL,
                range_start TEXT NOT NULL,
                range_end TEXT NOT NULL,
                first_date TEXT NOT NULL,
                last_date TEXT NOT NULL,
                count INTEGER NOT NULL,
                mean REAL NOT NULL,
                stdev REAL NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT
            );

            CREATE TABLE IF NOT EXISTS frequency_bins (
                run_id INTEGER NOT NULL REFERENCES analysis_runs(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                lower_bound REAL,
                upper_bound REAL,
                observed INTEGER NOT NULL,
                expected REAL NOT NULL,
                PRIMARY KEY (run_id, position)
            );

            CREATE TABLE IF NOT EXISTS z_scores (
                run_id INTEGER NOT NULL REFERENCES analysis_runs(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                z REAL,
                PRIMARY KEY (run_id, date)
            );

            CREATE TABLE IF NOT EXISTS tail_exceedances (
                run_id INTEGER NOT NULL REFERENCES analysis_runs(id) ON DELETE CASCADE,
                threshold REAL NOT NULL,
                observed INTEGER NOT NULL,
                expected REAL NOT NULL,
                PRIMARY KEY (run_id, threshold)
            );

            CREATE TABLE IF NOT EXISTS rejected_points (
                run_id INTEGER NOT NULL REFERENCES analysis_runs(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                reason TEXT NOT NULL
            );
            ",
        )?;

        Ok(Self { conn })
    }

    /// Saves a result computed on `as_of` and returns the new run id. A run already stored
    /// for the same index, kind, range and day is replaced.
    pub fn save_result(&mut self, result: &AnalysisResult, as_of: NaiveDate) -> Result<i64, StorageError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "DELETE FROM analysis_runs
             WHERE market_index = ?1 AND change_kind = ?2 AND as_of = ?3
               AND range_start = ?4 AND range_end = ?5",
            params![
                result.index.name(),
                result.change_kind.label(),
                as_of,
                result.requested_range.start(),
                result.requested_range.end(),
            ],
        )?;

        tx.execute(
            "INSERT INTO analysis_runs (
                market_index, change_kind, as_of, range_start, range_end,
                first_date, last_date, count, mean, stdev, status, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                result.index.name(),
                result.change_kind.label(),
                as_of,
                result.requested_range.start(),
                result.requested_range.end(),
                result.summary.date_range.0,
                result.summary.date_range.1,
                result.summary.count,
                result.summary.mean,
                result.summary.stdev,
                result.status.label(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                "INSERT INTO frequency_bins (run_id, position, lower_bound, upper_bound, observed, expected)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, bin) in result.bins.iter().enumerate() {
                stmt.execute(params![
                    run_id,
                    position,
                    finite(bin.lower_bound),
                    finite(bin.upper_bound),
                    bin.observed_count,
                    bin.expected_count,
                ])?;
            }

            let mut stmt = tx.prepare("INSERT INTO z_scores (run_id, date, z) VALUES (?1, ?2, ?3)")?;
            for point in &result.z_scores {
                stmt.execute(params![run_id, point.date, point.value.value()])?;
            }

            let mut stmt = tx.prepare(
                "INSERT INTO tail_exceedances (run_id, threshold, observed, expected)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for row in &result.exceedances {
                stmt.execute(params![
                    run_id,
                    row.threshold_sigma,
                    row.observed_count,
                    row.expected_count
                ])?;
            }

            let mut stmt =
                tx.prepare("INSERT INTO rejected_points (run_id, date, reason) VALUES (?1, ?2, ?3)")?;
            for rejected in &result.rejected {
                stmt.execute(params![run_id, rejected.date, rejected.reason.to_string()])?;
            }
        }

        tx.commit()?;
        Ok(run_id)
    }

    /// Most recent run for an index and change kind.
    pub fn latest_run(&self, index: MarketIndex, kind: ChangeKind) -> Result<Option<StoredRun>, StorageError> {
        let run = self
            .conn
            .query_row(
                "SELECT id, market_index, change_kind, as_of, first_date, last_date, count, mean, stdev, status
                 FROM analysis_runs WHERE market_index = ?1 AND change_kind = ?2
                 ORDER BY as_of DESC, id DESC LIMIT 1",
                params![index.name(), kind.label()],
                Self::map_run,
            )
            .optional()?;
        Ok(run)
    }

    /// Stored frequency table of a run, in bin order. NULL bounds are the open tails.
    pub fn bins_for(&self, run_id: i64) -> Result<Vec<FrequencyBin>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT lower_bound, upper_bound, observed, expected
             FROM frequency_bins WHERE run_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            let lower: Option<f64> = row.get(0)?;
            let upper: Option<f64> = row.get(1)?;
            Ok(FrequencyBin {
                lower_bound: lower.unwrap_or(f64::NEG_INFINITY),
                upper_bound: upper.unwrap_or(f64::INFINITY),
                observed_count: row.get(2)?,
                expected_count: row.get(3)?,
            })
        })?;

        let mut bins = Vec::new();
        for bin in rows {
            bins.push(bin?);
        }
        Ok(bins)
    }

    /// Stored z-score series of a run; `None` marks an undefined score.
    pub fn z_scores_for(&self, run_id: i64) -> Result<Vec<(NaiveDate, Option<f64>)>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, z FROM z_scores WHERE run_id = ?1 ORDER BY date ASC")?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, NaiveDate>(0)?, row.get::<_, Option<f64>>(1)?))
        })?;
        let scores: Vec<(NaiveDate, Option<f64>)> = rows.collect::<Result<_, _>>()?;
        Ok(scores)
    }

    fn map_run(row: &Row) -> Result<StoredRun, rusqlite::Error> {
        Ok(StoredRun {
            id: row.get(0)?,
            index: row.get(1)?,
            change_kind: row.get(2)?,
            as_of: row.get(3)?,
            first_date: row.get(4)?,
            last_date: row.get(5)?,
            count: row.get(6)?,
            mean: row.get(7)?,
            stdev: row.get(8)?,
            status: row.get(9)?,
        })
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
