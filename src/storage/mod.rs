pub mod artifacts;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::models::{CheckpointRecord, CheckpointStatus, DateRangeRequest, Game};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS run_id_seq;

CREATE TABLE IF NOT EXISTS checkpoints (
    date          DATE PRIMARY KEY,
    status        VARCHAR NOT NULL,
    games_count   INTEGER NOT NULL DEFAULT 0,
    error_msg     VARCHAR,
    processed_at  TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS games (
    date         DATE    NOT NULL,
    game_time    VARCHAR NOT NULL DEFAULT '',
    home_team    VARCHAR NOT NULL,
    away_team    VARCHAR NOT NULL,
    field        VARCHAR,
    league_name  VARCHAR,
    scraped_at   TIMESTAMP NOT NULL,
    PRIMARY KEY (date, game_time, home_team, away_team)
);

CREATE TABLE IF NOT EXISTS runs (
    id                INTEGER PRIMARY KEY DEFAULT nextval('run_id_seq'),
    started_at        TIMESTAMP NOT NULL,
    finished_at       TIMESTAMP,
    status            VARCHAR NOT NULL DEFAULT 'running',
    start_date        DATE,
    end_date          DATE,
    is_sub_execution  BOOLEAN NOT NULL DEFAULT FALSE,
    dates_processed   INTEGER DEFAULT 0,
    dates_skipped     INTEGER DEFAULT 0,
    error_msg         VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_games_date       ON games (date);
CREATE INDEX IF NOT EXISTS idx_games_league     ON games (league_name);
CREATE INDEX IF NOT EXISTS idx_checkpoints_status ON checkpoints (status);
"#;

// ── Repository ────────────────────────────────────────────────────────────────

/// DuckDB-backed store for checkpoints, the run log and the consolidated
/// games table. Shared across batch tasks, hence the lock.
pub struct Repository {
    conn: Mutex<Connection>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Mutex::new(Connection::open_in_memory()?) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("connection lock poisoned"))
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.conn()?;
        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute_batch(INDEXES).context("Index creation failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Checkpoints ───────────────────────────────────────────────────────────

    /// Upsert the checkpoint for a date. Last write wins.
    pub fn upsert_checkpoint(&self, record: &CheckpointRecord) -> Result<()> {
        self.conn()?
            .execute(
                r#"INSERT INTO checkpoints (date, status, games_count, error_msg, processed_at)
                   VALUES (?, ?, ?, ?, ?)
                   ON CONFLICT (date) DO UPDATE SET
                       status       = excluded.status,
                       games_count  = excluded.games_count,
                       error_msg    = excluded.error_msg,
                       processed_at = excluded.processed_at"#,
                params![
                    record.date,
                    record.status.as_str(),
                    record.games_count,
                    record.error,
                    record.processed_at,
                ],
            )
            .with_context(|| format!("upsert checkpoint {}", record.date))?;
        Ok(())
    }

    pub fn get_checkpoint(&self, date: NaiveDate) -> Result<Option<CheckpointRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT date, status, games_count, error_msg, processed_at
             FROM checkpoints WHERE date = ?",
        )?;
        let mut rows = stmt.query_map(params![date], |r| {
            Ok((
                r.get::<_, NaiveDate>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, chrono::NaiveDateTime>(4)?,
            ))
        })?;

        match rows.next() {
            Some(row) => {
                let (date, status, games_count, error, processed_at) = row?;
                let status = CheckpointStatus::parse(&status)
                    .ok_or_else(|| anyhow!("unknown checkpoint status '{}' for {}", status, date))?;
                Ok(Some(CheckpointRecord { date, status, games_count, error, processed_at }))
            }
            None => Ok(None),
        }
    }

    /// (success, failed) checkpoint counts within an inclusive date range.
    pub fn checkpoint_counts(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(usize, usize)> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM checkpoints
             WHERE date BETWEEN ? AND ? GROUP BY status",
        )?;
        let mut success = 0usize;
        let mut failed = 0usize;
        let rows = stmt.query_map(params![start, end], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            match CheckpointStatus::parse(&status) {
                Some(CheckpointStatus::Success) => success = count as usize,
                Some(CheckpointStatus::Failed) => failed = count as usize,
                None => {}
            }
        }
        Ok((success, failed))
    }

    pub fn checkpoint_total(&self) -> Result<i64> {
        let conn = self.conn()?;
        let mut s = conn.prepare("SELECT COUNT(*) FROM checkpoints")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    // ── Games ─────────────────────────────────────────────────────────────────

    /// Upsert games — idempotent, safe to re-run on same data.
    pub fn upsert_games(&self, games: &[Game]) -> Result<usize> {
        if games.is_empty() {
            return Ok(0);
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let sql = r#"
            INSERT INTO games
                (date, game_time, home_team, away_team, field, league_name, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (date, game_time, home_team, away_team) DO UPDATE SET
                field       = COALESCE(excluded.field,       games.field),
                league_name = COALESCE(excluded.league_name, games.league_name),
                scraped_at  = excluded.scraped_at
        "#;

        for game in games {
            tx.execute(
                sql,
                params![
                    game.date,
                    game.time,
                    game.home_team,
                    game.away_team,
                    game.field,
                    game.league_name,
                    game.scraped_at,
                ],
            )
            .with_context(|| format!("insert game {} {} v {}", game.date, game.home_team, game.away_team))?;
        }

        tx.commit()?;
        Ok(games.len())
    }

    pub fn game_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        let mut s = conn.prepare("SELECT COUNT(*) FROM games")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn game_date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let conn = self.conn()?;
        let mut s = conn.prepare("SELECT MIN(date), MAX(date) FROM games")?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    /// Export the consolidated games table for a range to a Parquet file.
    /// Whole-file overwrite, idempotent at the dataset level.
    pub fn export_parquet(&self, path: &Path, start: NaiveDate, end: NaiveDate) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let sql = format!(
            "COPY (SELECT * FROM games WHERE date BETWEEN '{}' AND '{}'
                   ORDER BY date, game_time, home_team)
             TO '{}' (FORMAT PARQUET)",
            start,
            end,
            path.display()
        );
        self.conn()?
            .execute_batch(&sql)
            .with_context(|| format!("Parquet export to {:?} failed", path))?;
        Ok(())
    }

    // ── Run log ───────────────────────────────────────────────────────────────

    pub fn begin_run(&self, req: &DateRangeRequest) -> Result<i64> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "INSERT INTO runs (started_at, status, start_date, end_date, is_sub_execution)
             VALUES (?, 'running', ?, ?, ?) RETURNING id",
        )?;
        let id: i64 = stmt.query_row(
            params![
                Utc::now().naive_utc(),
                req.start_date,
                req.end_date,
                req.is_sub_execution,
            ],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_run(
        &self,
        run_id: i64,
        processed: usize,
        skipped: usize,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn()?.execute(
            r#"UPDATE runs SET
               finished_at = ?, status = ?,
               dates_processed = ?, dates_skipped = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                processed as i64,
                skipped as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    fn checkpoint(date: &str, status: CheckpointStatus) -> CheckpointRecord {
        CheckpointRecord {
            date: d(date),
            status,
            games_count: 4,
            error: None,
            processed_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn checkpoint_round_trip() {
        let repo = repo();
        assert!(repo.get_checkpoint(d("2024-03-01")).unwrap().is_none());

        repo.upsert_checkpoint(&checkpoint("2024-03-01", CheckpointStatus::Success)).unwrap();
        let got = repo.get_checkpoint(d("2024-03-01")).unwrap().unwrap();
        assert_eq!(got.status, CheckpointStatus::Success);
        assert_eq!(got.games_count, 4);
    }

    #[test]
    fn checkpoint_last_write_wins() {
        let repo = repo();
        repo.upsert_checkpoint(&checkpoint("2024-03-01", CheckpointStatus::Failed)).unwrap();
        repo.upsert_checkpoint(&checkpoint("2024-03-01", CheckpointStatus::Success)).unwrap();

        let got = repo.get_checkpoint(d("2024-03-01")).unwrap().unwrap();
        assert_eq!(got.status, CheckpointStatus::Success);
        assert_eq!(repo.checkpoint_total().unwrap(), 1);
    }

    #[test]
    fn checkpoint_counts_respect_range() {
        let repo = repo();
        repo.upsert_checkpoint(&checkpoint("2024-03-01", CheckpointStatus::Success)).unwrap();
        repo.upsert_checkpoint(&checkpoint("2024-03-02", CheckpointStatus::Failed)).unwrap();
        repo.upsert_checkpoint(&checkpoint("2024-04-01", CheckpointStatus::Success)).unwrap();

        let (success, failed) = repo.checkpoint_counts(d("2024-03-01"), d("2024-03-31")).unwrap();
        assert_eq!((success, failed), (1, 1));
    }

    #[test]
    fn game_upsert_is_idempotent() {
        let repo = repo();
        let game = Game {
            date: d("2024-03-01"),
            time: "06:00 PM".into(),
            home_team: "Strikers".into(),
            away_team: "Rovers".into(),
            field: Some("Field 2".into()),
            league_name: Some("Adult Coed".into()),
            scraped_at: Utc::now().naive_utc(),
        };
        repo.upsert_games(std::slice::from_ref(&game)).unwrap();
        repo.upsert_games(std::slice::from_ref(&game)).unwrap();
        assert_eq!(repo.game_count().unwrap(), 1);

        let (min, max) = repo.game_date_range().unwrap();
        assert_eq!(min, Some(d("2024-03-01")));
        assert_eq!(max, Some(d("2024-03-01")));
    }

    #[test]
    fn run_log_round_trip() {
        let repo = repo();
        let req = DateRangeRequest {
            start_date: d("2024-03-01"),
            end_date: d("2024-03-09"),
            force_scrape: false,
            batch_size: 3,
            bucket: "data".into(),
            architecture_version: "v2".into(),
            is_sub_execution: false,
        };
        let id = repo.begin_run(&req).unwrap();
        repo.finish_run(id, 9, 0, None).unwrap();

        let id2 = repo.begin_run(&req).unwrap();
        assert_ne!(id, id2);
    }
}
