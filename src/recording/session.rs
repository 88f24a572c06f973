//! In-memory view of the current cassette

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Mode;
use crate::storage::{Cassette, CassetteStore, Interaction};
use crate::Result;

/// The loaded cassette and the file it belongs to.
///
/// Kept across calls so the file is only re-read when the store resolves a
/// different path, which happens on rotation.
#[derive(Debug, Default)]
pub struct CassetteSession {
    path: Option<PathBuf>,
    cassette: Cassette,
}

impl CassetteSession {
    /// Create an empty session; the cassette is loaded on first use
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure the session reflects the cassette that is current now.
    ///
    /// In record mode stale cassettes are rotated away; replay mode never
    /// deletes anything.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot resolve or load the cassette
    pub fn refresh(&mut self, store: &CassetteStore, mode: Mode) -> Result<()> {
        let path = match mode {
            Mode::Record => store.resolve_current_path()?,
            Mode::Replay => store.find_current_path()?,
        };

        if self.path.as_deref() == Some(path.as_path()) {
            return Ok(());
        }

        let cassette = store.load(&path)?;
        let older = store.list()?.len().saturating_sub(1);
        if older > 0 {
            warn!(
                path = %path.display(),
                older,
                "Multiple cassettes found, older ones are ignored"
            );
        }
        info!(
            path = %path.display(),
            interactions = cassette.len(),
            "Opened cassette"
        );

        self.path = Some(path);
        self.cassette = cassette;
        Ok(())
    }

    /// Record a new interaction and write the cassette back to disk.
    ///
    /// The in-memory copy is only updated once the write succeeded.
    ///
    /// # Errors
    ///
    /// Returns error if no cassette is open or the write fails
    pub fn record(&mut self, store: &CassetteStore, interaction: Interaction) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Err(crate::ProxyError::Other(
                "No cassette open for recording".to_string(),
            ));
        };

        let mut updated = self.cassette.clone();
        updated.append(interaction);
        store.persist(path, &updated)?;

        debug!(
            path = %path.display(),
            interactions = updated.len(),
            "Recorded interaction"
        );

        self.cassette = updated;
        Ok(())
    }

    /// Path of the open cassette
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Interactions of the open cassette in recording order
    #[must_use]
    pub fn interactions(&self) -> &[Interaction] {
        &self.cassette.interactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::storage::{Headers, RecordedRequest, RecordedResponse, Status};
    use bytes::Bytes;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store(dir: &Path, today: NaiveDate) -> CassetteStore {
        CassetteStore::new(dir, "rec", 1, Arc::new(FixedClock(today)))
    }

    fn interaction() -> Interaction {
        Interaction::new(
            RecordedRequest::new("GET", "http://a/b", Headers::new(), Bytes::new()),
            RecordedResponse {
                status: Status {
                    code: 200,
                    message: "OK".to_string(),
                },
                headers: Headers::new(),
                body: Bytes::from_static(b"hello"),
            },
        )
    }

    #[test]
    fn test_refresh_opens_fresh_cassette() {
        let temp_dir = TempDir::new().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let store = store(temp_dir.path(), today);

        let mut session = CassetteSession::new();
        session.refresh(&store, Mode::Record).unwrap();

        assert_eq!(session.path(), Some(store.path_for(today).as_path()));
        assert!(session.interactions().is_empty());
    }

    #[test]
    fn test_record_persists_and_updates_memory() {
        let temp_dir = TempDir::new().unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let store = store(temp_dir.path(), today);

        let mut session = CassetteSession::new();
        session.refresh(&store, Mode::Record).unwrap();
        session.record(&store, interaction()).unwrap();

        assert_eq!(session.interactions().len(), 1);
        assert_eq!(store.load(&store.path_for(today)).unwrap().len(), 1);
    }

    #[test]
    fn test_record_without_refresh_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(temp_dir.path(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());

        let mut session = CassetteSession::new();
        assert!(session.record(&store, interaction()).is_err());
    }

    #[test]
    fn test_rotation_drops_cached_interactions() {
        let temp_dir = TempDir::new().unwrap();
        let day1 = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let day5 = NaiveDate::from_ymd_opt(2024, 5, 5).unwrap();

        let mut session = CassetteSession::new();
        let first = store(temp_dir.path(), day1);
        session.refresh(&first, Mode::Record).unwrap();
        session.record(&first, interaction()).unwrap();

        let later = store(temp_dir.path(), day5);
        session.refresh(&later, Mode::Record).unwrap();

        assert_eq!(session.path(), Some(later.path_for(day5).as_path()));
        assert!(session.interactions().is_empty());
        assert!(!first.path_for(day1).exists());
    }

    #[test]
    fn test_replay_mode_keeps_stale_cassette() {
        let temp_dir = TempDir::new().unwrap();
        let day1 = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let day5 = NaiveDate::from_ymd_opt(2024, 5, 5).unwrap();

        let mut recorder = CassetteSession::new();
        let first = store(temp_dir.path(), day1);
        recorder.refresh(&first, Mode::Record).unwrap();
        recorder.record(&first, interaction()).unwrap();

        let mut replayer = CassetteSession::new();
        let later = store(temp_dir.path(), day5);
        replayer.refresh(&later, Mode::Replay).unwrap();

        assert_eq!(replayer.interactions().len(), 1);
        assert!(first.path_for(day1).exists());
    }

    #[test]
    fn test_several_cassettes_open_newest_once() {
        let temp_dir = TempDir::new().unwrap();
        let day1 = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let day2 = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let store = store(temp_dir.path(), day2);

        store.persist(&store.path_for(day1), &Cassette::default()).unwrap();
        let mut newest = Cassette::default();
        newest.append(interaction());
        store.persist(&store.path_for(day2), &newest).unwrap();

        let mut session = CassetteSession::new();
        session.refresh(&store, Mode::Replay).unwrap();
        assert_eq!(session.path(), Some(store.path_for(day2).as_path()));
        assert_eq!(session.interactions().len(), 1);

        // Same cassette again: the file is not re-read
        store.persist(&store.path_for(day2), &Cassette::default()).unwrap();
        session.refresh(&store, Mode::Replay).unwrap();
        assert_eq!(session.interactions().len(), 1);
        assert!(store.path_for(day1).exists());
    }
}
