//! `.stu` project persistence
//!
//! A `.stu` file is pretty-printed JSON of the normalized Project. Loading
//! runs upgrade -> parse -> normalize -> validate; saving normalizes first
//! and writes atomically (temp file + rename in the same directory).

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::document::Project;
use crate::normalize::{normalize, upgrade_document, UpgradeReport};
use crate::validate::{validate, Validation};

/// Errors from project persistence
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path} is not a valid project document: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("project failed validation: {}", .0.messages().join("; "))]
    Invalid(Validation),
}

/// A loaded project plus what the loader had to fix up
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub project: Project,
    pub upgrade: UpgradeReport,
}

/// Load and normalize a `.stu` file.
///
/// Legacy shapes are upgraded, numeric fields clamped, and derived entities
/// synthesized before validation. Remaining violations (e.g. unknown
/// pattern references) surface as [`StoreError::Invalid`].
pub fn load_project(path: &Path) -> Result<LoadedProject, StoreError> {
    let text = fs::read_to_string(path).map_err(|source| StoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut raw: Value = serde_json::from_str(&text).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let upgrade = upgrade_document(&mut raw);
    if !upgrade.is_empty() {
        tracing::info!(
            path = %path.display(),
            changes = upgrade.changes.len(),
            "upgraded legacy project shapes"
        );
    }

    let mut project: Project =
        serde_json::from_value(raw).map_err(|e| StoreError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    normalize(&mut project, &upgrade);

    let validation = validate(&project);
    if !validation.is_ok() {
        return Err(StoreError::Invalid(validation));
    }

    Ok(LoadedProject { project, upgrade })
}

/// Normalize and atomically write a project to `path`.
pub fn save_project(project: &Project, path: &Path) -> Result<(), StoreError> {
    let mut normalized = project.clone();
    normalize(&mut normalized, &UpgradeReport::default());

    let validation = validate(&normalized);
    if !validation.is_ok() {
        return Err(StoreError::Invalid(validation));
    }

    let json = serde_json::to_string_pretty(&normalized).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|source| StoreError::Write {
        path: parent.to_path_buf(),
        source,
    })?;

    // Temp file in the same directory so the rename stays on one filesystem
    let tmp = path.with_extension("stu.tmp");
    fs::write(&tmp, json).map_err(|source| StoreError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

/// Manages the `projects/` directory of the user data root
#[derive(Debug, Clone)]
pub struct ProjectStore {
    projects_dir: PathBuf,
}

impl ProjectStore {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Path of the `.stu` file for a project name
    pub fn path_for(&self, name: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.projects_dir.join(format!("{}.stu", safe))
    }

    pub fn save(&self, project: &Project) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&project.title);
        save_project(project, &path)?;
        tracing::info!(project.title = %project.title, path = %path.display(), "project saved");
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<LoadedProject, StoreError> {
        load_project(&self.path_for(name))
    }

    /// Load a project, collapsing parse/read failures to a fresh default.
    ///
    /// Validation failures are NOT collapsed; the caller surfaces those to
    /// the client with the offending ids.
    pub fn load_or_default(&self, name: &str) -> Result<LoadedProject, StoreError> {
        match self.load(name) {
            Ok(loaded) => Ok(loaded),
            Err(StoreError::Invalid(v)) => Err(StoreError::Invalid(v)),
            Err(e) => {
                tracing::warn!(project.name = %name, error = %e, "falling back to default project");
                Ok(LoadedProject {
                    project: Project::new(name),
                    upgrade: UpgradeReport::default(),
                })
            }
        }
    }

    /// Titles of every `.stu` file in the store
    pub fn list(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.projects_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| {
                let path = e.path();
                if path.extension().and_then(|s| s.to_str()) == Some("stu") {
                    path.file_stem().and_then(|s| s.to_str()).map(String::from)
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Clip, Pattern};
    use pretty_assertions::assert_eq;

    #[test]
    fn save_load_round_trip_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());

        let mut project = Project::new("Roundtrip Session");
        let mut pattern = Pattern::new("drum_custom", 16);
        pattern.swing = 0.2;
        pattern.set_step("Kick", 0, 1.0);
        pattern.set_step("OH", 7, 0.6);
        project.patterns.push(pattern);
        project.playlist[0]
            .clips
            .push(Clip::pattern("clip_custom", 1.25, 0.75, "drum_custom"));

        store.save(&project).unwrap();
        let loaded = store.load("Roundtrip Session").unwrap();

        assert_eq!(loaded.project, project);
    }

    #[test]
    fn save_is_atomic_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let path = store.save(&Project::new("Atomic")).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("stu.tmp").exists());
    }

    #[test]
    fn corrupt_file_collapses_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        std::fs::write(store.path_for("Broken"), "{not json").unwrap();

        let loaded = store.load_or_default("Broken").unwrap();
        assert_eq!(loaded.project.title, "Broken");
        assert_eq!(loaded.project.playlist.len(), 4);
    }

    #[test]
    fn legacy_document_loads_with_stub() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let legacy = serde_json::json!({
            "project_name": "Legacy Session",
            "bpm": 120,
            "playlist": [
                {
                    "track_id": 1,
                    "name": "Track 1",
                    "clips": [{"start": 0, "length": 4, "pattern": "midi_legacy_1"}]
                }
            ]
        });
        std::fs::write(
            store.path_for("Legacy Session"),
            serde_json::to_string(&legacy).unwrap(),
        )
        .unwrap();

        let loaded = store.load("Legacy Session").unwrap();
        assert_eq!(loaded.project.title, "Legacy Session");
        assert!(loaded.project.pattern("midi_legacy_1").is_some());

        let clip = &loaded.project.playlist[0].clips[0];
        assert_eq!(clip.pattern_id(), Some("midi_legacy_1"));
        assert!(!clip.id.is_empty());
    }

    #[test]
    fn unknown_pattern_reference_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let doc = serde_json::json!({
            "title": "Bad Ref",
            "bpm": 120,
            "playlist": [
                {
                    "track_id": 1,
                    "name": "Track 1",
                    "clips": [{
                        "id": "c1", "start": 0, "length": 4,
                        "type": "pattern", "pattern_id": "missing_pattern"
                    }]
                }
            ]
        });
        std::fs::write(store.path_for("Bad Ref"), serde_json::to_string(&doc).unwrap()).unwrap();

        match store.load("Bad Ref") {
            Err(StoreError::Invalid(v)) => {
                assert!(v.messages().iter().any(|m| m.contains("unknown pattern")));
            }
            other => panic!("expected validation failure, got {:?}", other.map(|l| l.project.title)),
        }
    }

    #[test]
    fn out_of_range_numerics_clamped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let doc = serde_json::json!({
            "title": "Clamped",
            "bpm": 301,
            "playlist_view_bars": 4,
            "playlist": [],
            "patterns": [],
            "mixer": [],
            "nodes": []
        });
        std::fs::write(store.path_for("Clamped"), serde_json::to_string(&doc).unwrap()).unwrap();

        let loaded = store.load("Clamped").unwrap();
        assert_eq!(loaded.project.bpm, 300);
        assert_eq!(loaded.project.playlist_view_bars, 8);
    }

    #[test]
    fn list_returns_sorted_stems() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        store.save(&Project::new("beta")).unwrap();
        store.save(&Project::new("alpha")).unwrap();

        assert_eq!(store.list(), vec!["alpha".to_string(), "beta".to_string()]);
    }
}
