use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use log::warn;

use crate::error::{AppError, Context, Result};
use crate::model::{HistoryRow, NewHistoryRow};

use super::{rows_since, HistoryStore};

const HEADER: [&str; 4] = ["timestamp", "signatureCount", "goal", "changeAmount"];

/// Append-only CSV history. Appends are serialised through a process-local lock.
#[derive(Debug, Clone)]
pub struct CsvHistoryStore {
    path: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl CsvHistoryStore {
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create history directory {}", parent.display())
                })?;
            }
        }

        ensure_header(&path)?;

        Ok(Self {
            path: Arc::new(path),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CsvHistoryStore {
    async fn append(&self, row: NewHistoryRow) -> Result<HistoryRow> {
        let path = Arc::clone(&self.path);
        let lock = Arc::clone(&self.write_lock);
        tokio::task::spawn_blocking(move || -> Result<HistoryRow> {
            let _guard = lock
                .lock()
                .map_err(|_| AppError::storage("history write lock poisoned"))?;
            let stored = row.stamped(Utc::now());
            append_row(&path, &stored)?;
            Ok(stored)
        })
        .await?
    }

    async fn select(&self, since: Option<DateTime<Utc>>) -> Result<Vec<HistoryRow>> {
        let path = Arc::clone(&self.path);
        let rows = tokio::task::spawn_blocking(move || read_rows(&path)).await??;
        Ok(rows_since(&rows, since))
    }
}

impl HistoryStore for CsvHistoryStore {
    fn insert(&self, row: NewHistoryRow) -> BoxFuture<'_, Result<HistoryRow>> {
        Box::pin(self.append(row))
    }

    fn query(&self, since: Option<DateTime<Utc>>) -> BoxFuture<'_, Result<Vec<HistoryRow>>> {
        Box::pin(self.select(since))
    }
}

fn ensure_header(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open history file {}", path.display()))?;

    let is_empty = file
        .metadata()
        .with_context(|| format!("Failed to stat history file {}", path.display()))?
        .len()
        == 0;

    if is_empty {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(HEADER)?;
        writer.flush()?;
    }
    Ok(())
}

fn append_row(path: &Path, row: &HistoryRow) -> Result<()> {
    let file = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open history file {}", path.display()))?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(&[
        row.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        row.signature_count.to_string(),
        row.goal.to_string(),
        row.change_amount.to_string(),
    ])?;
    writer.flush()?;
    Ok(())
}

// Reads the whole file on every query.
fn read_rows(path: &Path) -> Result<Vec<HistoryRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open history file {}", path.display()))?;

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.context("Failed to read history record")?;
        match parse_record(&record) {
            Some(row) => rows.push(row),
            None => warn!(
                "Skipping malformed history row {} in {}",
                line + 2,
                path.display()
            ),
        }
    }

    // Appends are chronological already; sort anyway in case the file was edited.
    rows.sort_by_key(|row| row.timestamp);
    Ok(rows)
}

fn parse_record(record: &csv::StringRecord) -> Option<HistoryRow> {
    let timestamp = DateTime::parse_from_rfc3339(record.get(0)?.trim())
        .ok()?
        .with_timezone(&Utc);
    let signature_count = record.get(1)?.trim().parse().ok()?;
    let goal = record.get(2)?.trim().parse().ok()?;
    let change_amount = record.get(3)?.trim().parse().ok()?;

    Some(HistoryRow {
        timestamp,
        signature_count,
        goal,
        change_amount,
    })
}
