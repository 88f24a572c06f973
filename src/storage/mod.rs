//! Dated cassette files: discovery, rotation, load and save

mod format;
mod reader;
mod writer;

pub use format::{
    headers_from_pairs, Cassette, Headers, Interaction, RecordedRequest, RecordedResponse, Status,
    CASSETTE_VERSION,
};
pub use reader::load;
pub use writer::persist;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::Result;

/// Cassette file extension
pub const CASSETTE_EXTENSION: &str = "yaml";

/// A cassette file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CassetteFile {
    /// File path
    pub path: PathBuf,
    /// Creation date embedded in the file name
    pub date: NaiveDate,
}

/// Manages the lifecycle of the dated cassette file in one directory
pub struct CassetteStore {
    dir: PathBuf,
    prefix: String,
    refresh_days: i64,
    clock: Arc<dyn Clock>,
}

impl CassetteStore {
    /// Create a store for `<dir>/<prefix>_<YYYY-MM-DD>.yaml` cassettes
    #[must_use]
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        refresh_days: i64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            refresh_days,
            clock,
        }
    }

    /// Path of a cassette created on `date`
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{CASSETTE_EXTENSION}",
            self.prefix,
            date.format("%Y-%m-%d")
        ))
    }

    /// Resolve the cassette to use for the current call.
    ///
    /// Returns the existing cassette if it is within the staleness window.
    /// A stale cassette is deleted and a fresh path dated today is returned;
    /// the new file is only created once something is recorded into it.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be scanned or the stale file
    /// cannot be removed
    pub fn resolve_current_path(&self) -> Result<PathBuf> {
        let today = self.clock.today();

        let Some(current) = self.find_current()? else {
            return Ok(self.path_for(today));
        };

        let age = (today - current.date).num_days();
        if age > self.refresh_days {
            info!(
                path = %current.path.display(),
                age_days = age,
                refresh_days = self.refresh_days,
                "Cassette is stale, starting a new one"
            );
            std::fs::remove_file(&current.path)?;
            return Ok(self.path_for(today));
        }

        debug!(path = %current.path.display(), age_days = age, "Using current cassette");
        Ok(current.path)
    }

    /// Path of the current cassette without rotating it.
    ///
    /// Falls back to a path dated today when no cassette exists.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be scanned
    pub fn find_current_path(&self) -> Result<PathBuf> {
        Ok(self
            .find_current()?
            .map_or_else(|| self.path_for(self.clock.today()), |file| file.path))
    }

    /// The current cassette file, if any.
    ///
    /// Only one cassette is expected per directory. If several exist the
    /// newest date wins (lexically greatest name) and the rest are reported.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be scanned
    pub fn find_current(&self) -> Result<Option<CassetteFile>> {
        let mut files = self.list()?;
        let current = files.pop();

        if let Some(current) = &current {
            for ignored in &files {
                debug!(
                    path = %ignored.path.display(),
                    current = %current.path.display(),
                    "Ignoring older cassette"
                );
            }
        }

        Ok(current)
    }

    /// All cassette files in the directory, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be scanned
    pub fn list(&self) -> Result<Vec<CassetteFile>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            match self.parse_file_name(name) {
                Some(Some(date)) => files.push(CassetteFile { path, date }),
                Some(None) => warn!(path = %path.display(), "Ignoring cassette with unparseable date"),
                None => {}
            }
        }

        files.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(files)
    }

    /// `None` if the name is not a cassette name at all, `Some(None)` if it
    /// looks like one but the date does not parse
    fn parse_file_name(&self, name: &str) -> Option<Option<NaiveDate>> {
        let stem = name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?
            .strip_suffix(CASSETTE_EXTENSION)?
            .strip_suffix('.')?;

        Some(NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok())
    }

    /// Load a cassette, empty if the file does not exist yet
    ///
    /// # Errors
    ///
    /// Returns error if the file is unreadable or corrupt
    pub fn load(&self, path: &Path) -> Result<Cassette> {
        load(path)
    }

    /// Write a cassette back to disk
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn persist(&self, path: &Path, cassette: &Cassette) -> Result<()> {
        persist(path, cassette)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use tempfile::TempDir;

    const PREFIX: &str = "test_server_recordings";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store(dir: &Path, today: NaiveDate, refresh_days: i64) -> CassetteStore {
        CassetteStore::new(dir, PREFIX, refresh_days, Arc::new(FixedClock(today)))
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "interactions: []\n").unwrap();
        path
    }

    #[test]
    fn test_path_for() {
        let store = store(Path::new("cache"), date(2024, 3, 9), 1);
        assert_eq!(
            store.path_for(date(2024, 3, 9)),
            Path::new("cache/test_server_recordings_2024-03-09.yaml")
        );
    }

    #[test]
    fn test_no_cassette_returns_fresh_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(temp_dir.path(), date(2024, 3, 9), 1);

        let path = store.resolve_current_path().unwrap();
        assert_eq!(path, store.path_for(date(2024, 3, 9)));
        assert!(!path.exists(), "fresh cassette is created lazily");
    }

    #[test]
    fn test_missing_directory_returns_fresh_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir.path().join("absent"), date(2024, 3, 9), 1);

        assert_eq!(
            store.resolve_current_path().unwrap(),
            store.path_for(date(2024, 3, 9))
        );
    }

    #[test]
    fn test_cassette_within_window_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let existing = touch(temp_dir.path(), "test_server_recordings_2024-03-08.yaml");

        // one day old, threshold one day
        let store = store(temp_dir.path(), date(2024, 3, 9), 1);
        assert_eq!(store.resolve_current_path().unwrap(), existing);
        assert!(existing.exists());
    }

    #[test]
    fn test_stale_cassette_is_rotated() {
        let temp_dir = TempDir::new().unwrap();
        let existing = touch(temp_dir.path(), "test_server_recordings_2024-03-07.yaml");

        // two days old, threshold one day
        let store = store(temp_dir.path(), date(2024, 3, 9), 1);
        let path = store.resolve_current_path().unwrap();

        assert_eq!(path, store.path_for(date(2024, 3, 9)));
        assert!(!existing.exists(), "stale cassette is deleted");
    }

    #[test]
    fn test_zero_day_window() {
        let temp_dir = TempDir::new().unwrap();
        let existing = touch(temp_dir.path(), "test_server_recordings_2024-03-09.yaml");

        let today_store = store(temp_dir.path(), date(2024, 3, 9), 0);
        assert_eq!(today_store.resolve_current_path().unwrap(), existing);

        let tomorrow_store = store(temp_dir.path(), date(2024, 3, 10), 0);
        let path = tomorrow_store.resolve_current_path().unwrap();
        assert_eq!(path, tomorrow_store.path_for(date(2024, 3, 10)));
        assert!(!existing.exists());
    }

    #[test]
    fn test_find_current_path_never_rotates() {
        let temp_dir = TempDir::new().unwrap();
        let existing = touch(temp_dir.path(), "test_server_recordings_2020-01-01.yaml");

        let store = store(temp_dir.path(), date(2024, 3, 9), 1);
        assert_eq!(store.find_current_path().unwrap(), existing);
        assert!(existing.exists());
    }

    #[test]
    fn test_multiple_cassettes_newest_wins() {
        let temp_dir = TempDir::new().unwrap();
        let older = touch(temp_dir.path(), "test_server_recordings_2024-03-01.yaml");
        let newer = touch(temp_dir.path(), "test_server_recordings_2024-03-08.yaml");

        let store = store(temp_dir.path(), date(2024, 3, 9), 1);
        assert_eq!(store.resolve_current_path().unwrap(), newer);
        assert!(older.exists(), "older cassettes are left alone");
    }

    #[test]
    fn test_unrelated_files_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "other_2024-03-08.yaml");
        touch(temp_dir.path(), "test_server_recordings_2024-03-08.yaml.tmp");
        touch(temp_dir.path(), "test_server_recordings_notadate.yaml");
        touch(temp_dir.path(), "test_server_recordings_2024-03-08.json");

        let store = store(temp_dir.path(), date(2024, 3, 9), 1);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_is_sorted() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "test_server_recordings_2024-03-08.yaml");
        touch(temp_dir.path(), "test_server_recordings_2023-12-31.yaml");

        let store = store(temp_dir.path(), date(2024, 3, 9), 1);
        let dates: Vec<_> = store.list().unwrap().into_iter().map(|f| f.date).collect();
        assert_eq!(dates, vec![date(2023, 12, 31), date(2024, 3, 8)]);
    }
}
