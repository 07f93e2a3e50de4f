//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;
use crate::availability::DeviceAvailabilityStats;

mod embedded {
    refinery::embed_migrations!("migrations");
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.9f";

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("connection lock poisoned")]
    Poisoned,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database at `path` and apply migrations.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let mut conn = Connection::open(path)?;
        embedded::migrations::runner()
            .run(&mut conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Stats samples ---

    /// Record a sample and return its ID.
    pub fn add_sample(
        &self,
        time: DateTime<Utc>,
        stats: &DeviceAvailabilityStats,
        latency_digest: &[u8],
    ) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO stats_samples (time, total_devices, available_devices, unavailable_devices, uptime_percent, latency_digest)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                format_db_time(time),
                stats.total_devices as i64,
                stats.available_devices as i64,
                stats.unavailable_devices as i64,
                stats.uptime_percent as i64,
                latency_digest,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Samples in `[start, end)`, oldest first.
    pub fn get_samples(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<StatsSample>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, time, total_devices, available_devices, unavailable_devices, uptime_percent, latency_digest
             FROM stats_samples
             WHERE time >= ?1 AND time < ?2 ORDER BY time ASC LIMIT ?3",
        )?;

        let samples = stmt
            .query_map(
                params![format_db_time(start), format_db_time(end), limit],
                sample_from_row,
            )?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(samples)
    }

    pub fn latest_sample(&self) -> Result<Option<StatsSample>, DbError> {
        let conn = self.conn()?;
        let sample = conn
            .query_row(
                "SELECT id, time, total_devices, available_devices, unavailable_devices, uptime_percent, latency_digest
                 FROM stats_samples ORDER BY time DESC, id DESC LIMIT 1",
                [],
                sample_from_row,
            )
            .optional()?;
        Ok(sample)
    }

    /// Delete samples older than `cutoff`, returning how many went.
    pub fn delete_samples_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM stats_samples WHERE time < ?1",
            params![format_db_time(cutoff)],
        )?;
        Ok(n)
    }

    // --- Check runs ---

    pub fn add_check_run(&self, run: &CheckRun) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO check_runs (started_at, finished_at, total_count, completed_count, uptime_percent)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.started_at.map(format_db_time),
                format_db_time(run.finished_at),
                run.total_count as i64,
                run.completed_count as i64,
                run.uptime_percent as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent runs first.
    pub fn get_check_runs(&self, limit: u32) -> Result<Vec<CheckRun>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, total_count, completed_count, uptime_percent
             FROM check_runs ORDER BY finished_at DESC, id DESC LIMIT ?1",
        )?;

        let runs = stmt
            .query_map(params![limit], |row| {
                let started: Option<String> = row.get(1)?;
                let finished: String = row.get(2)?;
                Ok(CheckRun {
                    id: row.get(0)?,
                    started_at: started.and_then(|s| parse_db_time(&s)),
                    finished_at: parse_db_time(&finished).unwrap_or_else(Utc::now),
                    total_count: row.get::<_, i64>(3)? as u64,
                    completed_count: row.get::<_, i64>(4)? as u64,
                    uptime_percent: row.get::<_, i64>(5)? as u32,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(runs)
    }

    /// Delete runs that finished before `cutoff`.
    pub fn delete_check_runs_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM check_runs WHERE finished_at < ?1",
            params![format_db_time(cutoff)],
        )?;
        Ok(n)
    }

    // --- Status Page Stats ---

    /// Get database size in bytes.
    pub fn get_db_size_bytes(&self) -> Result<i64, DbError> {
        let conn = self.conn()?;
        let page_count: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
        Ok(page_count * page_size)
    }

    /// Get freelist count.
    pub fn get_freelist_count(&self) -> Result<i64, DbError> {
        let conn = self.conn()?;
        Ok(conn.query_row("PRAGMA freelist_count", [], |r| r.get(0))?)
    }

    pub fn get_sample_stats(&self) -> Result<SampleStats, DbError> {
        let conn = self.conn()?;
        let (count, digest_bytes, oldest): (i64, i64, Option<String>) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(latency_digest)), 0), MIN(time) FROM stats_samples",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;

        Ok(SampleStats {
            count,
            digest_bytes,
            oldest: oldest.and_then(|s| parse_db_time(&s)),
        })
    }
}

fn sample_from_row(row: &Row<'_>) -> SqlResult<StatsSample> {
    let time_str: String = row.get(1)?;
    Ok(StatsSample {
        id: row.get(0)?,
        time: parse_db_time(&time_str).unwrap_or_else(Utc::now),
        stats: DeviceAvailabilityStats {
            total_devices: row.get::<_, i64>(2)? as u64,
            available_devices: row.get::<_, i64>(3)? as u64,
            unavailable_devices: row.get::<_, i64>(4)? as u64,
            uptime_percent: row.get::<_, i64>(5)? as u32,
        },
        latency_digest: row.get(6)?,
    })
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [TIME_FORMAT, "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
