use crate::error::ExtractionError;
use crate::fasta_io;
use crate::types::{LabelStrategy, SequenceRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

static BRACKETED_GENE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[gene=([^\]]+)\]").expect("valid gene tag pattern"));
static BARE_GENE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)gene=([^\s\]]+)").expect("valid gene tag pattern"));

type LabelRule = fn(&str) -> Option<String>;

/// Raw label rules, tried in order. The first token rule can yield accession-like
/// labels; that is kept on purpose and surfaces through the recorded strategy.
const LABEL_CHAIN: [(LabelStrategy, LabelRule); 3] = [
    (LabelStrategy::GeneTag, gene_tag),
    (LabelStrategy::PositionalToken, positional_token),
    (LabelStrategy::FirstToken, first_token),
];

fn gene_tag(header: &str) -> Option<String> {
    BRACKETED_GENE_TAG
        .captures(header)
        .or_else(|| BARE_GENE_TAG.captures(header))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|label| !label.is_empty())
}

fn positional_token(header: &str) -> Option<String> {
    header.split_whitespace().nth(1).map(str::to_string)
}

fn first_token(header: &str) -> Option<String> {
    header.split_whitespace().next().map(str::to_string)
}

/// Resolve the raw gene label of a FASTA header (without the leading `>`).
pub fn resolve_label(header: &str) -> Option<(String, LabelStrategy)> {
    LABEL_CHAIN
        .iter()
        .find_map(|(strategy, rule)| rule(header).map(|label| (label, *strategy)))
}

/// A FASTA file holds one sample; its stem becomes the taxon id of every record.
pub fn taxon_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace(char::is_whitespace, "_"))
        .unwrap_or_else(|| "unknown_sample".to_string())
}

pub fn extract_records(path: &Path, contents: &[u8]) -> Result<Vec<SequenceRecord>, ExtractionError> {
    let entries = fasta_io::read_entries(contents)
        .map_err(|e| ExtractionError::new(path, format!("unparsable FASTA: {}", e)))?;
    let taxon_id = taxon_from_path(path);
    let mut records = Vec::with_capacity(entries.len());

    for entry in entries {
        let (label, strategy) = resolve_label(&entry.header)
            .ok_or_else(|| ExtractionError::new(path, "unparsable header: empty FASTA header line"))?;
        if entry.sequence.is_empty() {
            debug!("Skipping empty sequence '{}' in {}", entry.header, path.display());
            continue;
        }
        records.push(SequenceRecord {
            taxon_id: taxon_id.clone(),
            marker_id: label,
            sequence: entry.sequence,
            source_file: path.to_path_buf(),
            label_strategy: strategy,
        });
    }

    if records.is_empty() {
        return Err(ExtractionError::new(path, "no records found"));
    }
    Ok(records)
}
