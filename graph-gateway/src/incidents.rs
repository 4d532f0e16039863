//! SQLite-backed incident store.
//!
//! The ingester maintains `incidents.db` in the data directory:
//!
//! ```sql
//! CREATE TABLE incidents (
//!     id          INTEGER PRIMARY KEY,
//!     file_path   TEXT NOT NULL,
//!     severity    TEXT NOT NULL,
//!     title       TEXT NOT NULL,
//!     occurred_at TEXT NOT NULL,          -- RFC3339 UTC
//!     embedding   BLOB                    -- little-endian f32 vector
//! );
//! ```
//!
//! The gateway opens the database read-only per query; all access runs on
//! the blocking pool. RFC3339 UTC strings compare lexicographically, which
//! keeps the window filter a plain `>=`.

use std::path::{Path, PathBuf};

use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags};

use crate::types::IncidentSummary;

/// Incident row used by fusion search.
#[derive(Debug, Clone)]
pub struct IncidentRow {
    pub id: i64,
    pub file_path: String,
    pub severity: String,
    pub title: String,
    pub occurred_at: String,
    pub embedding: Option<Vec<f32>>,
}

/// Handle to the incident database. Cheap to clone; connections are opened
/// per query.
#[derive(Debug, Clone)]
pub struct IncidentStore {
    db_path: PathBuf,
}

impl IncidentStore {
    /// Returns a store handle when the database file exists.
    pub fn open(db_path: &Path) -> Option<Self> {
        db_path.exists().then(|| Self {
            db_path: db_path.to_path_buf(),
        })
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }

    /// Aggregate incidents caused by `file_path` within the window.
    pub fn summary_for(
        &self,
        file_path: &str,
        window_days: i64,
    ) -> rusqlite::Result<IncidentSummary> {
        let cutoff = cutoff_rfc3339(window_days);
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT severity, title FROM incidents \
             WHERE file_path = ?1 AND occurred_at >= ?2 \
             ORDER BY occurred_at DESC",
        )?;
        let rows = stmt.query_map((file_path, cutoff.as_str()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut summary = IncidentSummary::default();
        for row in rows {
            let (severity, title) = row?;
            summary.count += 1;
            if !summary.severities.contains(&severity) {
                summary.severities.push(severity);
            }
            if summary.recent_titles.len() < 5 {
                summary.recent_titles.push(title);
            }
        }
        Ok(summary)
    }

    /// All rows within the window, embeddings decoded, for search fusion.
    pub fn rows_for_search(&self, window_days: i64) -> rusqlite::Result<Vec<IncidentRow>> {
        let cutoff = cutoff_rfc3339(window_days);
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, file_path, severity, title, occurred_at, embedding \
             FROM incidents WHERE occurred_at >= ?1",
        )?;
        let rows = stmt.query_map([cutoff.as_str()], |row| {
            let blob: Option<Vec<u8>> = row.get(5)?;
            Ok(IncidentRow {
                id: row.get(0)?,
                file_path: row.get(1)?,
                severity: row.get(2)?,
                title: row.get(3)?,
                occurred_at: row.get(4)?,
                embedding: blob.map(|b| decode_embedding(&b)),
            })
        })?;
        rows.collect()
    }
}

fn cutoff_rfc3339(window_days: i64) -> String {
    (Utc::now() - Duration::days(window_days)).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Decode a little-endian f32 BLOB; a trailing partial chunk is dropped.
fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store(dir: &Path) -> IncidentStore {
        let db = dir.join("incidents.db");
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE incidents (
                id INTEGER PRIMARY KEY,
                file_path TEXT NOT NULL,
                severity TEXT NOT NULL,
                title TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                embedding BLOB
            );",
        )
        .unwrap();

        let recent = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let ancient = "2019-01-01T00:00:00Z";
        let emb: Vec<u8> = [1.0f32, 0.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        conn.execute(
            "INSERT INTO incidents (file_path, severity, title, occurred_at, embedding)
             VALUES ('src/auth.rs', 'high', 'login outage', ?1, ?2)",
            (recent.as_str(), emb.as_slice()),
        )
        .unwrap();
        conn.execute(
            "INSERT INTO incidents (file_path, severity, title, occurred_at)
             VALUES ('src/auth.rs', 'low', 'stale incident', ?1)",
            [ancient],
        )
        .unwrap();

        IncidentStore::open(&db).unwrap()
    }

    #[test]
    fn summary_filters_by_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());
        let summary = store.summary_for("src/auth.rs", 180).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.severities, vec!["high".to_string()]);
        assert_eq!(summary.recent_titles, vec!["login outage".to_string()]);
    }

    #[test]
    fn rows_decode_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());
        let rows = store.rows_for_search(180).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].embedding.as_deref(), Some(&[1.0f32, 0.0][..]));
    }

    #[test]
    fn open_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(IncidentStore::open(&dir.path().join("missing.db")).is_none());
    }
}
