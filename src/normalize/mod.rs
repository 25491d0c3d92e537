pub mod synonyms;

pub use synonyms::{Nomenclature, SynonymTable};

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::types::{DataType, LabelStrategy, SequenceRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Result of normalizing one raw label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalization {
    pub marker_id: String,
    /// false when the raw label was passed through unchanged
    pub matched: bool,
}

/// Gene normalizer over an injected nomenclature lookup
#[derive(Clone)]
pub struct GeneNormalizer {
    nomenclature: Arc<dyn Nomenclature>,
    data_type: DataType,
}

impl GeneNormalizer {
    pub fn new(nomenclature: Arc<dyn Nomenclature>, data_type: DataType) -> Self {
        Self { nomenclature, data_type }
    }

    pub fn normalize(&self, raw_label: &str) -> Normalization {
        let trimmed = raw_label.trim();
        match self.nomenclature.lookup(trimmed, self.data_type) {
            Some(canonical) => Normalization {
                marker_id: canonical,
                matched: true,
            },
            None => Normalization {
                marker_id: trimmed.to_string(),
                matched: false,
            },
        }
    }

    /// Normalize the records of one file.
    ///
    /// Emits one fallback diagnostic per distinct unmatched label and one
    /// label-strategy summary per strategy used.
    pub fn normalize_file(&self, records: Vec<SequenceRecord>) -> (Vec<SequenceRecord>, Vec<Diagnostic>) {
        let mut fallbacks: BTreeMap<String, usize> = BTreeMap::new();
        let mut strategies: BTreeMap<LabelStrategy, usize> = BTreeMap::new();
        let source = records
            .first()
            .map(|r| r.source_file.display().to_string())
            .unwrap_or_default();

        let normalized = records
            .into_iter()
            .map(|mut record| {
                *strategies.entry(record.label_strategy).or_default() += 1;
                let outcome = self.normalize(&record.marker_id);
                if !outcome.matched {
                    *fallbacks.entry(outcome.marker_id.clone()).or_default() += 1;
                }
                record.marker_id = outcome.marker_id;
                record
            })
            .collect();

        let mut diagnostics: Vec<Diagnostic> = strategies
            .into_iter()
            .map(|(strategy, count)| {
                Diagnostic::new(
                    DiagnosticKind::LabelStrategy,
                    &source,
                    format!("{} label(s) taken from {}", count, strategy),
                )
            })
            .collect();
        for (label, count) in fallbacks {
            debug!("No canonical name for '{}' in {}", label, source);
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::NormalizationFallback,
                &source,
                format!("label '{}' has no canonical {} name; used verbatim ({} record(s))", label, self.data_type, count),
            ));
        }
        (normalized, diagnostics)
    }
}
