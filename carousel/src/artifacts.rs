//! Output files a finished run is expected to leave behind.
//!
//! The runner never touches these. A front end clears stale files before
//! `start` and inspects them once the run reports completion.

use crate::logging::LogSink;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files produced by the layout and rendering stages.
pub const DEFAULT_ARTIFACTS: [&str; 2] = ["report.html", "report.pdf"];

/// What happened to one stale file during [`ArtifactCheck::clear`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClearOutcome {
    /// The file did not exist.
    Absent,
    /// The file was deleted.
    Removed,
    /// The file exists but could not be deleted.
    Failed {
        /// The I/O error message.
        error: String,
    },
}

/// Presence of one expected output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStatus {
    /// File name relative to the root.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    /// Size in bytes, if the file exists.
    pub size_bytes: Option<u64>,
}

impl ArtifactStatus {
    /// Returns true if the file exists.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.size_bytes.is_some()
    }

    /// Message shown in place of a missing file.
    #[must_use]
    pub fn missing_hint(&self) -> Option<String> {
        if self.is_present() {
            return None;
        }
        let hint = if self.name.ends_with(".pdf") {
            "Did the PDF conversion step succeed?"
        } else {
            "Check console logs for issues."
        };
        Some(format!("{} not found. {hint}", self.name))
    }
}

/// A set of expected output files under one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCheck {
    root: PathBuf,
    names: Vec<String>,
}

impl ArtifactCheck {
    /// Expects the default artifacts under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            names: DEFAULT_ARTIFACTS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Replaces the expected file names.
    #[must_use]
    pub fn with_artifacts<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Removes stale outputs, writing one log line per file touched.
    pub fn clear(&self, log: &LogSink) -> Vec<(String, ClearOutcome)> {
        self.names
            .iter()
            .map(|name| {
                let outcome = match std::fs::remove_file(self.root.join(name)) {
                    Ok(()) => {
                        debug!(artifact = %name, "Removed stale artifact");
                        log.line(&format!("Removed previous {name}."));
                        ClearOutcome::Removed
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => ClearOutcome::Absent,
                    Err(e) => {
                        warn!(artifact = %name, error = %e, "Unable to remove stale artifact");
                        log.line(&format!("Unable to remove {name}: {e}"));
                        ClearOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                (name.clone(), outcome)
            })
            .collect()
    }

    /// Reports which outputs exist.
    #[must_use]
    pub fn inspect(&self) -> Vec<ArtifactStatus> {
        self.names
            .iter()
            .map(|name| {
                let path = self.root.join(name);
                let size_bytes = std::fs::metadata(&path)
                    .ok()
                    .filter(std::fs::Metadata::is_file)
                    .map(|meta| meta.len());
                ArtifactStatus {
                    name: name.clone(),
                    path,
                    size_bytes,
                }
            })
            .collect()
    }

    /// Returns true if every expected output exists.
    #[must_use]
    pub fn all_present(&self) -> bool {
        self.inspect().iter().all(ArtifactStatus::is_present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFallback;
    use crate::observer::CollectingObserver;
    use std::sync::Arc;

    #[test]
    fn test_clear_removes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.html"), "<html></html>").unwrap();

        let observer = Arc::new(CollectingObserver::new());
        let log = LogSink::new(observer.clone(), LogFallback::Discard);
        let outcomes = ArtifactCheck::new(dir.path()).clear(&log);

        assert_eq!(
            outcomes,
            vec![
                ("report.html".to_string(), ClearOutcome::Removed),
                ("report.pdf".to_string(), ClearOutcome::Absent),
            ]
        );
        assert_eq!(observer.logs(), vec!["Removed previous report.html."]);
        assert!(!dir.path().join("report.html").exists());
    }

    #[test]
    fn test_clear_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be removed with remove_file.
        std::fs::create_dir(dir.path().join("report.pdf")).unwrap();

        let observer = Arc::new(CollectingObserver::new());
        let log = LogSink::new(observer.clone(), LogFallback::Discard);
        let outcomes = ArtifactCheck::new(dir.path()).clear(&log);

        assert!(matches!(outcomes[1].1, ClearOutcome::Failed { .. }));
        assert!(observer.logs()[0].starts_with("Unable to remove report.pdf:"));
    }

    #[test]
    fn test_inspect_reports_presence_and_hints() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.html"), "<html></html>").unwrap();

        let check = ArtifactCheck::new(dir.path());
        let statuses = check.inspect();

        assert_eq!(statuses[0].size_bytes, Some(13));
        assert!(statuses[0].missing_hint().is_none());
        assert!(!statuses[1].is_present());
        assert_eq!(
            statuses[1].missing_hint().as_deref(),
            Some("report.pdf not found. Did the PDF conversion step succeed?")
        );
        assert!(!check.all_present());
    }

    #[test]
    fn test_custom_artifact_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("deck.pdf"), "%PDF").unwrap();

        let check = ArtifactCheck::new(dir.path()).with_artifacts(["deck.pdf"]);
        assert!(check.all_present());
        assert_eq!(check.root(), dir.path());
    }
}
