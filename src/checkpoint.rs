// "Last run" bookkeeping kept in a small JSON file next to the reports.
//
// The store decides the default fetch window: runs start where the last
// successful run stopped, and only a successful run moves that point.
use crate::error::ReportError;
use crate::fetch::FetchWindow;
use crate::util::is_window_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// First `updatedFrom` used when no run has ever succeeded.
pub const DEFAULT_FROM_DATE: &str = "2025-02-24T00:00:00";

pub const STATUS_SUCCESS: &str = "Success";
pub const STATUS_FETCH_FAILED: &str = "Fetch failed";

const WINDOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Manual `updatedTo` override; ignored unless it is a valid timestamp.
    #[serde(default)]
    pub to_date: Option<String>,
    #[serde(default)]
    pub last_successful_to: Option<String>,
    #[serde(default)]
    pub last_run: Option<String>,
    #[serde(default)]
    pub last_status: Option<String>,
}

impl RunMetadata {
    pub fn resolve_to_date(&self, now: DateTime<Utc>) -> String {
        match self.to_date.as_deref() {
            Some(to) if is_window_timestamp(to) => to.trim().to_string(),
            _ => now.format(WINDOW_FORMAT).to_string(),
        }
    }

    pub fn resolve_from_date(&self) -> String {
        self.last_successful_to
            .clone()
            .unwrap_or_else(|| DEFAULT_FROM_DATE.to_string())
    }

    /// Window for the next run; explicit bounds win over stored ones.
    pub fn window(&self, from: Option<String>, to: Option<String>, now: DateTime<Utc>) -> FetchWindow {
        FetchWindow {
            from: from.unwrap_or_else(|| self.resolve_from_date()),
            to: to.unwrap_or_else(|| self.resolve_to_date(now)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means nothing recorded yet.
    pub fn load(&self) -> Result<RunMetadata, ReportError> {
        if !self.path.exists() {
            return Ok(RunMetadata::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, meta: &RunMetadata) -> Result<(), ReportError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(meta)?)?;
        Ok(())
    }

    pub fn record_success(&self, window: &FetchWindow, at: DateTime<Utc>) -> Result<(), ReportError> {
        let mut meta = self.load()?;
        meta.last_successful_to = Some(window.to.clone());
        meta.last_run = Some(at.format(WINDOW_FORMAT).to_string());
        meta.last_status = Some(STATUS_SUCCESS.to_string());
        self.save(&meta)
    }

    /// Note the failure without touching the checkpoint.
    pub fn record_failure(&self, status: &str, at: DateTime<Utc>) -> Result<(), ReportError> {
        let mut meta = self.load().unwrap_or_else(|e| {
            warn!(error = %e, "metadata unreadable, starting fresh");
            RunMetadata::default()
        });
        meta.last_run = Some(at.format(WINDOW_FORMAT).to_string());
        meta.last_status = Some(status.to_string());
        self.save(&meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn defaults_without_any_history() {
        let meta = RunMetadata::default();
        let window = meta.window(None, None, at());
        assert_eq!(window.from, DEFAULT_FROM_DATE);
        assert_eq!(window.to, "2025-03-01T12:30:00");
    }

    #[test]
    fn to_date_override_must_be_valid() {
        let mut meta = RunMetadata {
            to_date: Some("2025-02-28T00:00:00".into()),
            ..RunMetadata::default()
        };
        assert_eq!(meta.resolve_to_date(at()), "2025-02-28T00:00:00");
        meta.to_date = Some("yesterday".into());
        assert_eq!(meta.resolve_to_date(at()), "2025-03-01T12:30:00");
    }

    #[test]
    fn only_success_advances_the_checkpoint() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = MetadataStore::open(tmp.path().join("meta").join("fts.json"));
        assert_eq!(store.load().unwrap(), RunMetadata::default());

        let window = FetchWindow {
            from: DEFAULT_FROM_DATE.into(),
            to: "2025-03-01T00:00:00".into(),
        };
        store.record_success(&window, at()).unwrap();
        store.record_failure(STATUS_FETCH_FAILED, at()).unwrap();

        let meta = store.load().unwrap();
        assert_eq!(meta.last_successful_to.as_deref(), Some("2025-03-01T00:00:00"));
        assert_eq!(meta.last_status.as_deref(), Some(STATUS_FETCH_FAILED));
        assert_eq!(meta.window(None, None, at()).from, "2025-03-01T00:00:00");
        assert_eq!(
            meta.window(Some("2025-01-01T00:00:00".into()), None, at()).from,
            "2025-01-01T00:00:00"
        );
    }
}
