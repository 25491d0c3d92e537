use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::ExtractionError;
use crate::types::{LabelStrategy, SequenceRecord};
use gb_io::reader::SeqReader;
use gb_io::seq::{Feature, Location, Seq};
use std::path::Path;
use tracing::{debug, warn};

/// Records and per-feature skips from one GenBank file
#[derive(Debug, Default)]
pub struct GenBankExtraction {
    pub records: Vec<SequenceRecord>,
    pub skipped: Vec<Diagnostic>,
}

fn qualifier(feature: &Feature, key: &str) -> Option<String> {
    feature
        .qualifier_values(key.into())
        .map(|value| value.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|value| !value.is_empty())
}

fn locus_name(entry: &Seq) -> &str {
    entry.name.as_deref().unwrap_or("unnamed")
}

/// `Organism_name_VERSION`; falls back to ACCESSION, then the LOCUS name.
pub fn taxon_id(entry: &Seq) -> String {
    let organism = entry
        .features
        .iter()
        .filter(|f| f.kind.to_string() == "source")
        .find_map(|f| qualifier(f, "organism"))
        .or_else(|| entry.source.as_ref().and_then(|s| s.organism.clone()))
        .unwrap_or_else(|| "Unknown".to_string());
    let identifier = entry
        .version
        .as_deref()
        .or(entry.accession.as_deref())
        .unwrap_or_else(|| locus_name(entry));
    format!("{}_{}", organism.trim().replace(' ', "_"), identifier)
}

/// Raw label of a CDS: `/gene`, else `/product`.
pub fn cds_label(feature: &Feature) -> Option<(String, LabelStrategy)> {
    qualifier(feature, "gene")
        .map(|gene| (gene, LabelStrategy::GeneQualifier))
        .or_else(|| qualifier(feature, "product").map(|product| (product, LabelStrategy::ProductQualifier)))
}

/// Residues of a feature within its own entry, upper-cased.
fn cds_residues(entry: &Seq, location: &Location) -> Result<String, String> {
    let (start, end) = location.find_bounds().map_err(|e| format!("{:?}", e))?;
    if start < 0 || end > entry.seq.len() as i64 {
        return Err(format!("location {}..{} outside a {} bp sequence", start + 1, end, entry.seq.len()));
    }
    let residues = entry.extract_location(location).map_err(|e| format!("{:?}", e))?;
    if residues.is_empty() {
        return Err("empty sequence".to_string());
    }
    Ok(String::from_utf8_lossy(&residues).to_ascii_uppercase())
}

/// Turn each CDS with a gene (or, failing that, product) qualifier into a record.
///
/// A CDS whose residues cannot be taken from the entry (remote reference,
/// out-of-range span) is skipped with a diagnostic. The file fails only when
/// it cannot be parsed or no record survives.
pub fn extract_records(path: &Path, contents: &[u8]) -> Result<GenBankExtraction, ExtractionError> {
    let mut extraction = GenBankExtraction::default();
    let mut entries = 0;

    for entry in SeqReader::new(contents) {
        let entry = entry.map_err(|e| ExtractionError::new(path, format!("unparsable GenBank: {}", e)))?;
        entries += 1;
        let taxon_id = taxon_id(&entry);

        for feature in entry.features.iter().filter(|f| f.kind.to_string() == "CDS") {
            let Some((label, strategy)) = cds_label(feature) else {
                debug!("Skipping CDS in {}: no gene or product qualifier", locus_name(&entry));
                continue;
            };
            match cds_residues(&entry, &feature.location) {
                Ok(sequence) => extraction.records.push(SequenceRecord {
                    taxon_id: taxon_id.clone(),
                    marker_id: label,
                    sequence,
                    source_file: path.to_path_buf(),
                    label_strategy: strategy,
                }),
                Err(reason) => {
                    let subject = format!("{}:{}/{}", path.display(), locus_name(&entry), label);
                    warn!("Skipping CDS {}: {}", subject, reason);
                    extraction
                        .skipped
                        .push(Diagnostic::new(DiagnosticKind::SkippedFeature, subject, reason));
                }
            }
        }
    }

    if entries == 0 {
        return Err(ExtractionError::new(path, "no GenBank entries found"));
    }
    if extraction.records.is_empty() {
        let reason = match extraction.skipped.first() {
            Some(first) => format!("no records found ({} CDS skipped, first: {})", extraction.skipped.len(), first.message),
            None => "no records found".to_string(),
        };
        return Err(ExtractionError::new(path, reason));
    }
    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
LOCUS       TEST01                    24 bp    DNA     circular INV 01-JAN-2024
DEFINITION  Test organism mitochondrion, partial genome.
ACCESSION   TEST01
VERSION     TEST01.1
SOURCE      mitochondrion Testus exemplaris
  ORGANISM  Testus exemplaris
            Eukaryota; Metazoa.
FEATURES             Location/Qualifiers
     source          1..24
                     /organism=\"Testus exemplaris\"
     gene            1..9
                     /gene=\"COX1\"
     CDS             1..9
                     /gene=\"COX1\"
                     /product=\"cytochrome c oxidase
                     subunit I\"
     CDS             complement(10..15)
                     /gene=\"nad1\"
     CDS             join(16..18,22..24)
                     /product=\"ATP synthase F0 subunit 8\"
     misc_feature    19..21
                     /note=\"no qualifiers of interest\"
ORIGIN
        1 atggcaaaaa ccgggtaaat tggc
//
";

    const REMOTE_SIBLING: &str = "\
LOCUS       T1                        24 bp    DNA     linear   PLN 01-JAN-2024
ACCESSION   T1
VERSION     T1.1
SOURCE      chloroplast Plantus testus
  ORGANISM  Plantus testus
FEATURES             Location/Qualifiers
     source          1..24
                     /organism=\"Plantus testus\"
     CDS             1..9
                     /gene=\"COX1\"
     CDS             join(OTHER.1:1..5,10..15)
                     /gene=\"rps12\"
     CDS             20..40
                     /gene=\"ND1\"
ORIGIN
        1 atggcaaaaa ccgggtaaat tggc
//
";

    #[test]
    fn test_every_labelled_cds_yields_one_record() {
        let extraction = extract_records(Path::new("sample.gb"), SAMPLE.as_bytes()).unwrap();
        let records = &extraction.records;
        assert_eq!(records.len(), 3);
        assert!(extraction.skipped.is_empty());

        assert_eq!(records[0].taxon_id, "Testus_exemplaris_TEST01.1");
        assert_eq!(records[0].marker_id, "COX1");
        assert_eq!(records[0].sequence, "ATGGCAAAA");
        assert_eq!(records[0].label_strategy, LabelStrategy::GeneQualifier);

        // complement(10..15) of "ACCGGG" is "CCCGGT"
        assert_eq!(records[1].marker_id, "nad1");
        assert_eq!(records[1].sequence, "CCCGGT");

        assert_eq!(records[2].marker_id, "ATP synthase F0 subunit 8");
        assert_eq!(records[2].sequence, "TAAGGC");
        assert_eq!(records[2].label_strategy, LabelStrategy::ProductQualifier);
    }

    #[test]
    fn test_unextractable_cds_is_skipped_not_fatal() {
        let extraction = extract_records(Path::new("t1.gb"), REMOTE_SIBLING.as_bytes()).unwrap();

        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].marker_id, "COX1");
        assert_eq!(extraction.records[0].sequence, "ATGGCAAAA");

        let subjects: Vec<_> = extraction.skipped.iter().map(|d| d.subject.as_str()).collect();
        assert_eq!(subjects, vec!["t1.gb:T1/rps12", "t1.gb:T1/ND1"]);
        assert!(extraction.skipped.iter().all(|d| d.kind == DiagnosticKind::SkippedFeature));
    }

    #[test]
    fn test_file_without_cds_reports_no_records() {
        let text = "\
LOCUS       EMPTY                      4 bp    DNA     linear   INV 01-JAN-2024
FEATURES             Location/Qualifiers
     source          1..4
ORIGIN
        1 acgt
//
";
        let err = extract_records(Path::new("empty.gb"), text.as_bytes()).unwrap_err();
        assert!(err.reason.starts_with("no records found"));
        assert_eq!(err.file, Path::new("empty.gb"));
    }

    #[test]
    fn test_fasta_text_is_not_genbank() {
        assert!(extract_records(Path::new("x.gb"), b">seq1\nACGT\n").is_err());
    }
}
