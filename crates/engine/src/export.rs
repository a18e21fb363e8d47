//! Signal-log export. The in-memory book stays authoritative; a failed
//! export is logged and retried with the next snapshot.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

use common::{Error, Result, SignalEntry};

use crate::book::SharedBook;

/// Why a snapshot was requested. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportReason {
    Fired,
    Resolved,
    Shutdown,
}

#[async_trait]
pub trait SignalExporter: Send + Sync {
    /// Persist the full set of confirmed entries, replacing earlier snapshots.
    async fn export(&self, entries: &[SignalEntry]) -> Result<()>;

    /// Release the backing store. Called once, after the final snapshot.
    async fn close(&self) {}
}

/// Queue a snapshot request without waiting.
///
/// A full channel already holds a pending snapshot, so the request is
/// dropped. A closed channel means the exporter is gone and is logged.
pub fn request_export(tx: &mpsc::Sender<ExportReason>, reason: ExportReason) {
    match tx.try_send(reason) {
        Ok(()) | Err(TrySendError::Full(_)) => {}
        Err(TrySendError::Closed(reason)) => {
            warn!(?reason, "Exporter is gone, snapshot request dropped");
        }
    }
}

const CSV_HEADER: [&str; 13] = [
    "id",
    "symbol",
    "signal_type",
    "confidence",
    "entry_price",
    "entry_time",
    "target_price",
    "stop_price",
    "exit_price",
    "exit_time",
    "outcome",
    "status",
    "rationale",
];

fn csv_record(entry: &SignalEntry) -> [String; 13] {
    [
        entry.id().to_string(),
        entry.symbol().to_string(),
        entry.side().to_string(),
        entry.confidence().to_string(),
        entry.entry_price().to_string(),
        entry.entry_time().to_rfc3339(),
        entry.target_price().to_string(),
        entry.stop_price().to_string(),
        entry.exit_price().map(|p| p.to_string()).unwrap_or_default(),
        entry.exit_time().map(|t| t.to_rfc3339()).unwrap_or_default(),
        entry.outcome().map(|o| o.to_string()).unwrap_or_default(),
        entry.status().to_string(),
        entry.rationale().to_string(),
    ]
}

/// Whole-file CSV snapshot, written to a sibling temp file then renamed.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    path: PathBuf,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_snapshot(path: &Path, rows: Vec<[String; 13]>) -> Result<()> {
        let tmp = path.with_extension("csv.tmp");
        let mut writer = csv::Writer::from_path(&tmp).map_err(|e| Error::Export(e.to_string()))?;
        writer
            .write_record(CSV_HEADER)
            .map_err(|e| Error::Export(e.to_string()))?;
        for row in &rows {
            writer
                .write_record(row)
                .map_err(|e| Error::Export(e.to_string()))?;
        }
        writer.flush()?;
        drop(writer);
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl SignalExporter for CsvExporter {
    async fn export(&self, entries: &[SignalEntry]) -> Result<()> {
        let rows: Vec<[String; 13]> = entries.iter().map(csv_record).collect();
        let count = rows.len();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::write_snapshot(&path, rows))
            .await
            .map_err(|e| Error::Export(e.to_string()))??;
        debug!(path = %self.path.display(), count, "Signal log written");
        Ok(())
    }
}

/// Upserts every entry into a `signals` table keyed by id.
pub struct SqliteExporter {
    pool: SqlitePool,
}

impl SqliteExporter {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options: SqliteConnectOptions = database_url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let exporter = Self { pool };
        exporter.ensure_schema().await?;
        info!(database_url, "SQLite signal log ready");
        Ok(exporter)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS signals (
                id            TEXT PRIMARY KEY,
                symbol        TEXT NOT NULL,
                signal_type   TEXT NOT NULL,
                confidence    REAL NOT NULL,
                entry_price   REAL NOT NULL,
                entry_time    TEXT NOT NULL,
                target_price  REAL NOT NULL,
                stop_price    REAL NOT NULL,
                exit_price    REAL,
                exit_time     TEXT,
                outcome       TEXT,
                status        TEXT NOT NULL,
                rationale     TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SignalExporter for SqliteExporter {
    async fn export(&self, entries: &[SignalEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO signals (id, symbol, signal_type, confidence, entry_price, entry_time,
                    target_price, stop_price, exit_price, exit_time, outcome, status, rationale)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                    exit_price = excluded.exit_price,
                    exit_time  = excluded.exit_time,
                    outcome    = excluded.outcome,
                    status     = excluded.status",
            )
            .bind(entry.id().to_string())
            .bind(entry.symbol())
            .bind(entry.side().to_string())
            .bind(entry.confidence())
            .bind(entry.entry_price())
            .bind(entry.entry_time().to_rfc3339())
            .bind(entry.target_price())
            .bind(entry.stop_price())
            .bind(entry.exit_price())
            .bind(entry.exit_time().map(|t| t.to_rfc3339()))
            .bind(entry.outcome().map(|o| o.to_string()))
            .bind(entry.status().to_string())
            .bind(entry.rationale())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(count = entries.len(), "Signal log upserted");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Signal database closed");
    }
}

/// Snapshot the confirmed entries and hand them to `exporter`.
/// Errors are logged, not returned.
pub async fn flush(book: &SharedBook, exporter: &dyn SignalExporter, reason: ExportReason) {
    // Snapshot under the read lock, write without it.
    let entries = book.read().await.confirmed();
    match exporter.export(&entries).await {
        Ok(()) => debug!(?reason, count = entries.len(), "Export complete"),
        Err(e) => error!(?reason, error = %e, "Signal log export failed"),
    }
}

/// Single writer task: drains export requests until every sender is gone.
/// Requests that pile up while an export runs collapse into one snapshot.
pub async fn run_exporter(
    mut rx: mpsc::Receiver<ExportReason>,
    book: SharedBook,
    exporter: std::sync::Arc<dyn SignalExporter>,
) {
    while let Some(reason) = rx.recv().await {
        while rx.try_recv().is_ok() {}
        flush(&book, exporter.as_ref(), reason).await;
    }
    debug!("Export channel closed");
}
