use super::artifacts::ensure_unique_names;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::types::{MarkerSet, SequenceRecord};
use std::collections::BTreeMap;
use tracing::warn;

/// Groups normalized records into one `MarkerSet` per marker id.
///
/// Records must be pushed in a deterministic order (sorted file order); on a
/// duplicate `(taxon, marker)` pair the first sequence is kept.
#[derive(Debug, Default)]
pub struct MarkerSplitter {
    sets: BTreeMap<String, MarkerSet>,
    diagnostics: Vec<Diagnostic>,
}

impl MarkerSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: SequenceRecord) {
        let set = self
            .sets
            .entry(record.marker_id.clone())
            .or_insert_with(|| MarkerSet::new(record.marker_id.clone()));

        if !set.insert(record.taxon_id.clone(), record.sequence) {
            warn!(
                "Duplicate {} sequence for {} in {}; keeping the first",
                record.marker_id,
                record.taxon_id,
                record.source_file.display()
            );
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::DuplicateMarkerRecord,
                format!("{}/{}", record.marker_id, record.taxon_id),
                format!(
                    "duplicate record from {} ignored; first sequence kept",
                    record.source_file.display()
                ),
            ));
        }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = SequenceRecord>) {
        for record in records {
            self.push(record);
        }
    }

    pub fn marker_count(&self) -> usize {
        self.sets.len()
    }

    /// Marker sets ordered by marker id, each with a distinct file name, plus
    /// duplicate and rename diagnostics.
    pub fn finish(self) -> (Vec<MarkerSet>, Vec<Diagnostic>) {
        let mut sets: Vec<MarkerSet> = self.sets.into_values().collect();
        let mut diagnostics = self.diagnostics;
        diagnostics.extend(ensure_unique_names(&mut sets));
        (sets, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LabelStrategy;
    use std::path::PathBuf;

    fn record(taxon: &str, marker: &str, seq: &str, file: &str) -> SequenceRecord {
        SequenceRecord {
            taxon_id: taxon.to_string(),
            marker_id: marker.to_string(),
            sequence: seq.to_string(),
            source_file: PathBuf::from(file),
            label_strategy: LabelStrategy::GeneTag,
        }
    }

    #[test]
    fn test_groups_by_marker_in_id_order() {
        let mut splitter = MarkerSplitter::new();
        splitter.extend(vec![
            record("A", "ND1", "AAA", "a.fasta"),
            record("A", "COI", "CCC", "a.fasta"),
            record("B", "COI", "GGG", "b.fasta"),
        ]);
        let (sets, diagnostics) = splitter.finish();

        assert!(diagnostics.is_empty());
        let ids: Vec<_> = sets.iter().map(|s| s.marker_id.as_str()).collect();
        assert_eq!(ids, vec!["COI", "ND1"]);
        assert_eq!(sets[0].len(), 2);
        assert_eq!(sets[0].width, None);
    }

    #[test]
    fn test_markers_sharing_a_file_name_stay_apart() {
        let mut splitter = MarkerSplitter::new();
        splitter.extend(vec![
            record("A", "trnL(UAA)", "AAAA", "a.fasta"),
            record("A", "trnL_UAA_", "CCCC", "a.fasta"),
        ]);
        let (sets, diagnostics) = splitter.finish();

        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].marker_id, "trnL(UAA)");
        assert_eq!(sets[0].get("A"), Some("AAAA"));
        assert_eq!(sets[1].marker_id, "trnL_UAA__2");
        assert_eq!(sets[1].get("A"), Some("CCCC"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::MarkerRenamed);
    }

    #[test]
    fn test_duplicate_keeps_first_and_reports() {
        let mut splitter = MarkerSplitter::new();
        splitter.push(record("A", "COI", "FIRST", "a1.fasta"));
        splitter.push(record("A", "COI", "SECOND", "a2.fasta"));
        let (sets, diagnostics) = splitter.finish();

        assert_eq!(sets[0].get("A"), Some("FIRST"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::DuplicateMarkerRecord);
        assert_eq!(diagnostics[0].subject, "COI/A");
        assert!(diagnostics[0].message.contains("a2.fasta"));
    }
}
