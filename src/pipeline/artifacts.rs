use crate::constants::{
    ALIGNED_MARKERS_DIR, BENCHMARK_FILE, DIAGNOSTICS_FILE, LOGS_DIR, MANIFEST_FILE, PHYLOGENY_DIR,
    RAW_MARKERS_DIR, SUPERMATRIX_FILE, TREE_PREFIX, TRIMMED_MARKERS_DIR,
};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::fasta_io;
use crate::types::{MarkerSet, StageName};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

static UNSAFE_ID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid identifier pattern"));

/// Make a marker id usable as a file name and a NEXUS token.
pub fn sanitize(id: &str) -> String {
    let cleaned = UNSAFE_ID_CHARS.replace_all(id.trim(), "_").into_owned();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Rename markers whose sanitized ids collide with an earlier one.
///
/// Sanitized ids name marker files and CHARSETs, so they must be unique. Sets are
/// visited in order; a later colliding marker gets the first free `_N` suffix.
pub fn ensure_unique_names(sets: &mut [MarkerSet]) -> Vec<Diagnostic> {
    let mut taken: HashSet<String> = sets.iter().map(|set| set.marker_id.clone()).collect();
    let mut used = HashSet::new();
    let mut diagnostics = Vec::new();

    for set in sets.iter_mut() {
        if used.insert(sanitize(&set.marker_id)) {
            continue;
        }
        let renamed = (2..)
            .map(|n| format!("{}_{}", set.marker_id, n))
            .find(|candidate| !taken.contains(candidate) && !used.contains(&sanitize(candidate)))
            .unwrap_or_default();
        warn!("Marker {} shares a file name with another marker; renamed to {}", set.marker_id, renamed);
        diagnostics.push(Diagnostic::new(
            DiagnosticKind::MarkerRenamed,
            &set.marker_id,
            format!("file name '{}' already used; renamed to {}", sanitize(&set.marker_id), renamed),
        ));
        used.insert(sanitize(&renamed));
        taken.insert(renamed.clone());
        set.marker_id = renamed;
    }
    diagnostics
}

/// Paths of everything a run writes under the output directory
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create(&self) -> io::Result<()> {
        fs::create_dir_all(self.root.join(RAW_MARKERS_DIR))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn supermatrix_path(&self) -> PathBuf {
        self.root.join(SUPERMATRIX_FILE)
    }

    pub fn diagnostics_path(&self) -> PathBuf {
        self.root.join(DIAGNOSTICS_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn benchmark_path(&self) -> PathBuf {
        self.root.join(BENCHMARK_FILE)
    }

    pub fn phylogeny_dir(&self) -> PathBuf {
        self.root.join(PHYLOGENY_DIR)
    }

    pub fn tree_prefix(&self) -> PathBuf {
        self.phylogeny_dir().join(TREE_PREFIX)
    }

    /// Per-marker FASTA path for the output of `stage` (`Extract` is the raw set).
    pub fn marker_path(&self, stage: StageName, marker_id: &str) -> PathBuf {
        let id = sanitize(marker_id);
        match stage {
            StageName::Extract => self.root.join(RAW_MARKERS_DIR).join(format!("{}.fasta", id)),
            StageName::Align => self
                .root
                .join(ALIGNED_MARKERS_DIR)
                .join(format!("{}_aligned.fasta", id)),
            StageName::Trim => self
                .root
                .join(TRIMMED_MARKERS_DIR)
                .join(format!("{}_trimmed.fasta", id)),
        }
    }

    pub fn write_marker(&self, stage: StageName, set: &MarkerSet) -> io::Result<PathBuf> {
        let path = self.marker_path(stage, &set.marker_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fasta_io::write_entries(&path, set.records.iter().map(|(t, s)| (t.as_str(), s.as_str())))?;
        Ok(path)
    }

    /// `write_marker` on the blocking pool, for callers running on async workers.
    pub async fn persist_marker(&self, stage: StageName, set: &MarkerSet) -> io::Result<PathBuf> {
        let layout = self.clone();
        let set = set.clone();
        tokio::task::spawn_blocking(move || layout.write_marker(stage, &set))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RawMarker,
    AlignedMarker,
    TrimmedMarker,
    Supermatrix,
    Tree,
    Diagnostics,
}

impl From<StageName> for ArtifactKind {
    fn from(stage: StageName) -> Self {
        match stage {
            StageName::Extract => ArtifactKind::RawMarker,
            StageName::Align => ArtifactKind::AlignedMarker,
            StageName::Trim => ArtifactKind::TrimmedMarker,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactEntry {
    pub kind: ArtifactKind,
    /// Relative to the output directory
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
}

/// Digest listing of every artifact of one run
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub artifacts: Vec<ArtifactEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            artifacts: Vec::new(),
        }
    }

    pub fn add(&mut self, kind: ArtifactKind, root: &Path, path: &Path) -> io::Result<()> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let bytes = io::copy(&mut file, &mut hasher)?;
        let relative = path.strip_prefix(root).unwrap_or(path);
        self.artifacts.push(ArtifactEntry {
            kind,
            path: relative.display().to_string(),
            bytes,
            sha256: hex::encode(hasher.finalize()),
        });
        Ok(())
    }

    pub fn write(&self, path: &Path) -> crate::error::Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_colliding_sanitized_ids_are_renamed() {
        let mut sets = vec![
            MarkerSet::new("trnL(UAA)"),
            MarkerSet::new("trnL_UAA_"),
            MarkerSet::new("trnL_UAA__2"),
            MarkerSet::new("COI"),
        ];
        let diagnostics = ensure_unique_names(&mut sets);

        let ids: Vec<_> = sets.iter().map(|s| s.marker_id.as_str()).collect();
        assert_eq!(ids, vec!["trnL(UAA)", "trnL_UAA__3", "trnL_UAA__2", "COI"]);
        let names: HashSet<_> = sets.iter().map(|s| sanitize(&s.marker_id)).collect();
        assert_eq!(names.len(), 4);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::MarkerRenamed);
        assert_eq!(diagnostics[0].subject, "trnL_UAA_");
    }

    #[test]
    fn test_sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize("ATP synthase F0 subunit 8"), "ATP_synthase_F0_subunit_8");
        assert_eq!(sanitize("nad4L"), "nad4L");
        assert_eq!(sanitize("trnL(UAA)/psbA"), "trnL_UAA__psbA");
        assert_eq!(sanitize("  "), "_");
    }

    #[test]
    fn test_marker_paths_follow_stage_layout() {
        let layout = ArtifactLayout::new("/out");
        assert_eq!(layout.marker_path(StageName::Extract, "COI"), Path::new("/out/01-raw_markers/COI.fasta"));
        assert_eq!(
            layout.marker_path(StageName::Align, "COI"),
            Path::new("/out/02-aligned_markers/COI_aligned.fasta")
        );
        assert_eq!(
            layout.marker_path(StageName::Trim, "COI"),
            Path::new("/out/03-trimmed_markers/COI_trimmed.fasta")
        );
    }

    #[test]
    fn test_manifest_records_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("supermatrix.nex");
        fs::write(&path, "abc").unwrap();

        let mut manifest = Manifest::new();
        manifest.add(ArtifactKind::Supermatrix, dir.path(), &path).unwrap();

        let entry = &manifest.artifacts[0];
        assert_eq!(entry.path, "supermatrix.nex");
        assert_eq!(entry.bytes, 3);
        assert_eq!(
            entry.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
