use crate::error::WidthInconsistencyError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Organelle panel used when looking up canonical marker names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Mitochondrial genes
    #[default]
    Mt,
    /// Chloroplast genes
    Cp,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Mt => write!(f, "mt"),
            DataType::Cp => write!(f, "cp"),
        }
    }
}

/// Declared input format. `Auto` picks per file by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    #[default]
    Auto,
    Genbank,
    Fasta,
}

/// Concrete format of one input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    GenBank,
    Fasta,
}

/// How the raw gene label of a record was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStrategy {
    /// FASTA `gene=` tag
    GeneTag,
    /// Second whitespace token of a FASTA header
    PositionalToken,
    /// First whitespace token of a FASTA header
    FirstToken,
    /// GenBank `/gene` qualifier
    GeneQualifier,
    /// GenBank `/product` qualifier
    ProductQualifier,
}

impl fmt::Display for LabelStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LabelStrategy::GeneTag => "gene_tag",
            LabelStrategy::PositionalToken => "positional_token",
            LabelStrategy::FirstToken => "first_token",
            LabelStrategy::GeneQualifier => "gene_qualifier",
            LabelStrategy::ProductQualifier => "product_qualifier",
        };
        f.write_str(name)
    }
}

/// One extracted sequence. Before normalization `marker_id` holds the raw label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceRecord {
    pub taxon_id: String,
    pub marker_id: String,
    pub sequence: String,
    pub source_file: PathBuf,
    pub label_strategy: LabelStrategy,
}

/// All sequences of one marker, keyed by taxon.
///
/// `width` is only set once a stage has produced an equal-length set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkerSet {
    pub marker_id: String,
    pub records: BTreeMap<String, String>,
    pub width: Option<usize>,
}

impl MarkerSet {
    pub fn new(marker_id: impl Into<String>) -> Self {
        Self {
            marker_id: marker_id.into(),
            records: BTreeMap::new(),
            width: None,
        }
    }

    /// Build a set whose sequences must all share one length (stage output).
    pub fn aligned(
        marker_id: impl Into<String>,
        records: BTreeMap<String, String>,
    ) -> std::result::Result<Self, WidthInconsistencyError> {
        let mut set = Self {
            marker_id: marker_id.into(),
            records,
            width: None,
        };
        let lengths = set.lengths();
        if lengths.len() > 1 {
            return Err(WidthInconsistencyError {
                marker_id: set.marker_id,
                lengths: lengths.into_iter().collect(),
            });
        }
        set.width = lengths.into_iter().next();
        Ok(set)
    }

    /// Insert a sequence unless the taxon is already present. Returns false on duplicates.
    pub fn insert(&mut self, taxon_id: impl Into<String>, sequence: impl Into<String>) -> bool {
        match self.records.entry(taxon_id.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(sequence.into());
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn taxa(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn get(&self, taxon_id: &str) -> Option<&str> {
        self.records.get(taxon_id).map(String::as_str)
    }

    /// Distinct sequence lengths present in the set
    pub fn lengths(&self) -> BTreeSet<usize> {
        self.records.values().map(|s| s.len()).collect()
    }

    /// The single non-zero width shared by every sequence, if there is one.
    pub fn uniform_width(&self) -> std::result::Result<usize, WidthInconsistencyError> {
        let lengths = self.lengths();
        match (lengths.len(), lengths.iter().next()) {
            (1, Some(&width)) if width > 0 => Ok(width),
            _ => Err(WidthInconsistencyError {
                marker_id: self.marker_id.clone(),
                lengths: lengths.into_iter().collect(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Extract,
    Align,
    Trim,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageName::Extract => write!(f, "extract"),
            StageName::Align => write!(f, "align"),
            StageName::Trim => write!(f, "trim"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Ok,
    Skipped,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Ok => write!(f, "ok"),
            StageStatus::Skipped => write!(f, "skipped"),
            StageStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one stage for one marker
#[derive(Debug, Clone)]
pub struct StageResult {
    pub marker_id: String,
    pub stage_name: StageName,
    pub status: StageStatus,
    pub output: Option<MarkerSet>,
    pub diagnostics: String,
    pub elapsed: Duration,
}

impl StageResult {
    pub fn ok(stage_name: StageName, output: MarkerSet, elapsed: Duration) -> Self {
        let diagnostics = match output.width {
            Some(width) => format!("{} sequences, width {}", output.len(), width),
            None => format!("{} sequences", output.len()),
        };
        Self {
            marker_id: output.marker_id.clone(),
            stage_name,
            status: StageStatus::Ok,
            output: Some(output),
            diagnostics,
            elapsed,
        }
    }

    pub fn skipped(stage_name: StageName, output: MarkerSet) -> Self {
        Self {
            marker_id: output.marker_id.clone(),
            stage_name,
            status: StageStatus::Skipped,
            output: Some(output),
            diagnostics: "stage disabled".to_string(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn failed(marker_id: &str, stage_name: StageName, diagnostics: String, elapsed: Duration) -> Self {
        Self {
            marker_id: marker_id.to_string(),
            stage_name,
            status: StageStatus::Failed,
            output: None,
            diagnostics,
            elapsed,
        }
    }
}

/// Per-marker pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerState {
    Raw,
    Aligned,
    Trimmed,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_first_sequence() {
        let mut set = MarkerSet::new("COI");
        assert!(set.insert("taxon_a", "ACGT"));
        assert!(!set.insert("taxon_a", "TTTT"));
        assert_eq!(set.get("taxon_a"), Some("ACGT"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_aligned_rejects_unequal_lengths() {
        let mut records = BTreeMap::new();
        records.insert("a".to_string(), "ACG".to_string());
        records.insert("b".to_string(), "ACGT".to_string());
        let err = MarkerSet::aligned("ND1", records).unwrap_err();
        assert_eq!(err.lengths, vec![3, 4]);
    }

    #[test]
    fn test_aligned_sets_width() {
        let mut records = BTreeMap::new();
        records.insert("a".to_string(), "AC-T".to_string());
        records.insert("b".to_string(), "ACGT".to_string());
        let set = MarkerSet::aligned("ND1", records).unwrap();
        assert_eq!(set.width, Some(4));
        assert_eq!(set.uniform_width().unwrap(), 4);
    }

    #[test]
    fn test_zero_width_is_not_uniform() {
        let mut set = MarkerSet::new("ATP8");
        set.insert("a", "");
        assert!(set.uniform_width().is_err());
    }
}
