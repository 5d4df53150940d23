//! # Result Export
//!
//! Writes query results as CSV under the export directory and hands back a
//! link the hub serves at `/exports`. File names carry a random component,
//! and [`sweep_loop`] deletes files once they are older than the
//! configured TTL.

use crate::warehouse::{cell_text, QueryOutput};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

/// Route prefix the export directory is mounted under.
pub const EXPORT_ROUTE: &str = "/exports";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode CSV: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub url: String,
    pub rows: usize,
}

#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
    public_url: String,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `output` to `{date}/results_{time}_{fingerprint8}_{uuid}.csv`.
    pub fn write(&self, output: &QueryOutput, sql: &str) -> Result<ExportedFile, ExportError> {
        self.write_at(output, sql, Utc::now())
    }

    fn write_at(
        &self,
        output: &QueryOutput,
        sql: &str,
        now: DateTime<Utc>,
    ) -> Result<ExportedFile, ExportError> {
        let fingerprint = sf_core::fingerprint(sql);
        let date = now.format("%Y-%m-%d").to_string();
        let name = format!(
            "results_{}_{}_{}.csv",
            now.format("%H%M%S"),
            &fingerprint[..8],
            Uuid::new_v4().simple()
        );
        let relative = format!("{}/{}", date, name);

        let folder = self.dir.join(&date);
        std::fs::create_dir_all(&folder).map_err(|source| ExportError::Io {
            path: folder.clone(),
            source,
        })?;
        let path = folder.join(&name);

        let mut writer = csv::WriterBuilder::new()
            .double_quote(true)
            .from_path(&path)?;
        writer.write_record(&output.columns)?;
        for row in &output.rows {
            writer.write_record(row.iter().map(cell_text))?;
        }
        writer.flush().map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;

        tracing::info!(
            "Exported {} row(s) to {:?} (query {})",
            output.rows.len(),
            path,
            &fingerprint[..8]
        );
        Ok(ExportedFile {
            url: format!("{}{}/{}", self.public_url, EXPORT_ROUTE, relative),
            path,
            rows: output.rows.len(),
        })
    }

    /// Delete exported files last modified before `now - ttl`, then any
    /// past date folder left empty. Today's folder is never removed.
    /// Returns the number of files removed.
    pub fn sweep(&self, ttl: Duration, now: SystemTime) -> Result<usize, ExportError> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ExportError::Io { path, source }
        };
        let Some(cutoff) = now.checked_sub(ttl) else {
            return Ok(0);
        };
        if !self.dir.exists() {
            return Ok(0);
        }

        let today = DateTime::<Utc>::from(now).format("%Y-%m-%d").to_string();
        let mut removed = 0;
        for folder in std::fs::read_dir(&self.dir).map_err(io(&self.dir))? {
            let folder = folder.map_err(io(&self.dir))?.path();
            if !folder.is_dir() {
                continue;
            }
            let mut kept = 0;
            for file in std::fs::read_dir(&folder).map_err(io(&folder))? {
                let file = file.map_err(io(&folder))?.path();
                let modified = std::fs::metadata(&file)
                    .and_then(|m| m.modified())
                    .map_err(io(&file))?;
                if file.is_file() && modified < cutoff {
                    std::fs::remove_file(&file).map_err(io(&file))?;
                    removed += 1;
                } else {
                    kept += 1;
                }
            }
            if kept == 0 && !folder.ends_with(&today) {
                std::fs::remove_dir(&folder).map_err(io(&folder))?;
            }
        }
        Ok(removed)
    }
}

/// Run [`Exporter::sweep`] every `interval` for the life of the process.
pub async fn sweep_loop(exporter: Exporter, ttl: Duration, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let exporter = exporter.clone();
        match tokio::task::spawn_blocking(move || exporter.sweep(ttl, SystemTime::now())).await {
            Ok(Ok(0)) => {}
            Ok(Ok(n)) => tracing::info!("Removed {} expired export(s)", n),
            Ok(Err(e)) => tracing::warn!("Export sweep failed: {}", e),
            Err(e) => tracing::warn!("Export sweep task failed: {}", e),
        }
    }
}

/// Slack mrkdwn message with a labelled link.
pub fn link_message(message: &str, url: &str, label: &str) -> String {
    format!("{} <{}|{}>", message, url, label)
}
