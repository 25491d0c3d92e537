use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A file could not be parsed and contributed no records
    ExtractionError,
    /// A CDS whose residues could not be taken from its own entry
    SkippedFeature,
    /// Which header/qualifier strategy produced raw labels for a file
    LabelStrategy,
    /// A raw label had no canonical match and was used verbatim
    NormalizationFallback,
    /// A taxon appeared twice for one marker; the first sequence was kept
    DuplicateMarkerRecord,
    /// Two marker ids mapped to one file name; the later one was renamed
    MarkerRenamed,
    /// An external tool failed for one marker
    StageExecutionError,
    /// A marker's sequences did not share one width at concatenation
    WidthInconsistencyError,
    /// Tree inference failed on the concatenated matrix
    TreeInferenceError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// File path, marker id or `marker/taxon` the entry is about
    pub subject: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            message: message.into(),
        }
    }
}

/// Aggregated non-fatal findings of a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticsReport {
    pub entries: Vec<Diagnostic>,
    /// file path -> reason
    pub failed_files: BTreeMap<String, String>,
    /// marker id -> reason
    pub excluded_markers: BTreeMap<String, String>,
}

impl DiagnosticsReport {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.entries.extend(diagnostics);
    }

    pub fn file_failed(&mut self, file: &Path, reason: impl Into<String>) {
        let file = file.display().to_string();
        let reason = reason.into();
        self.entries.push(Diagnostic::new(DiagnosticKind::ExtractionError, &file, &reason));
        self.failed_files.insert(file, reason);
    }

    /// Record that a marker will not appear in the final matrix.
    pub fn marker_excluded(&mut self, kind: DiagnosticKind, marker_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        self.entries.push(Diagnostic::new(kind, marker_id, &reason));
        self.excluded_markers.insert(marker_id.to_string(), reason);
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
