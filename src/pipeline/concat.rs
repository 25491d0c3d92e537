//! Supermatrix assembly.
//!
//! Rows are the union of taxa across all included markers, in sorted order.
//! Markers are laid out left to right in marker-id order; a taxon without a
//! marker gets exactly that marker's width of gap characters.

use super::artifacts::{ensure_unique_names, sanitize};
use crate::constants::{ALIGNMENT_SUFFIXES, FASTA_EXTENSIONS, GAP};
use crate::error::{PipelineError, Result, WidthInconsistencyError};
use crate::fasta_io;
use crate::types::MarkerSet;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::Path;
use tracing::{info, warn};

/// Every taxon id seen across the included markers
#[derive(Debug, Default)]
pub struct TaxonIndex {
    taxa: BTreeSet<String>,
}

impl TaxonIndex {
    pub fn observe(&mut self, set: &MarkerSet) {
        self.taxa.extend(set.taxa().map(str::to_string));
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    pub fn into_ordered(self) -> Vec<String> {
        self.taxa.into_iter().collect()
    }
}

/// Column range of one marker, `start` is 0-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerBlock {
    pub start: usize,
    pub width: usize,
}

#[derive(Debug, Clone)]
pub struct ConcatenatedMatrix {
    pub taxa: Vec<String>,
    pub markers: Vec<String>,
    pub blocks: BTreeMap<String, MarkerBlock>,
    rows: BTreeMap<String, String>,
}

impl ConcatenatedMatrix {
    pub fn n_taxa(&self) -> usize {
        self.taxa.len()
    }

    pub fn n_chars(&self) -> usize {
        self.blocks.values().map(|b| b.width).sum()
    }

    pub fn row(&self, taxon_id: &str) -> Option<&str> {
        self.rows.get(taxon_id).map(String::as_str)
    }

    /// The slice of `taxon_id`'s row that belongs to `marker_id`.
    pub fn cell(&self, taxon_id: &str, marker_id: &str) -> Option<&str> {
        let block = self.blocks.get(marker_id)?;
        self.row(taxon_id)
            .map(|row| &row[block.start..block.start + block.width])
    }

    pub fn write_nexus<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "#NEXUS")?;
        writeln!(out, "BEGIN DATA;")?;
        writeln!(out, "DIMENSIONS NTAX={} NCHAR={};", self.n_taxa(), self.n_chars())?;
        writeln!(out, "FORMAT DATATYPE=DNA GAP={} MISSING=?;", GAP)?;
        writeln!(out, "MATRIX")?;

        let labels: Vec<String> = self
            .taxa
            .iter()
            .map(|t| format!("'{}'", t.replace('\'', "''")))
            .collect();
        let pad = labels.iter().map(String::len).max().unwrap_or(0);
        for (taxon, label) in self.taxa.iter().zip(&labels) {
            writeln!(out, "{:<pad$} {}", label, self.rows[taxon], pad = pad)?;
        }
        writeln!(out, ";")?;
        writeln!(out, "END;")?;
        writeln!(out)?;

        writeln!(out, "BEGIN SETS;")?;
        for marker in &self.markers {
            let block = self.blocks[marker];
            writeln!(
                out,
                "    CHARSET {} = {}-{};",
                sanitize(marker),
                block.start + 1,
                block.start + block.width
            )?;
        }
        writeln!(out, "END;")?;
        Ok(())
    }

    pub fn write_nexus_file(&self, path: &Path) -> io::Result<()> {
        let mut out = io::BufWriter::new(std::fs::File::create(path)?);
        self.write_nexus(&mut out)?;
        out.flush()
    }
}

/// Concatenation result: the matrix (if any marker survived) and excluded markers
#[derive(Debug)]
pub struct Concatenation {
    pub matrix: Option<ConcatenatedMatrix>,
    pub excluded: Vec<WidthInconsistencyError>,
}

/// Join marker sets by taxon. Markers without a single non-zero width are excluded.
pub fn concatenate(mut markers: Vec<MarkerSet>) -> Concatenation {
    markers.sort_by(|a, b| a.marker_id.cmp(&b.marker_id));

    let mut excluded = Vec::new();
    let mut included = Vec::new();
    for set in markers {
        match set.uniform_width() {
            Ok(width) => included.push((set, width)),
            Err(e) => {
                warn!("Excluding {} from the supermatrix: {}", set.marker_id, e);
                excluded.push(e);
            }
        }
    }
    if included.is_empty() {
        return Concatenation { matrix: None, excluded };
    }

    let mut index = TaxonIndex::default();
    let mut blocks = BTreeMap::new();
    let mut start = 0;
    for (set, width) in &included {
        index.observe(set);
        blocks.insert(set.marker_id.clone(), MarkerBlock { start, width: *width });
        start += width;
    }
    let taxa = index.into_ordered();

    let rows = taxa
        .iter()
        .map(|taxon| {
            let mut row = String::with_capacity(start);
            for (set, width) in &included {
                match set.get(taxon) {
                    Some(sequence) => row.push_str(sequence),
                    None => row.extend(std::iter::repeat(GAP).take(*width)),
                }
            }
            (taxon.clone(), row)
        })
        .collect();

    let matrix = ConcatenatedMatrix {
        markers: included.iter().map(|(set, _)| set.marker_id.clone()).collect(),
        taxa,
        blocks,
        rows,
    };
    info!(
        "Supermatrix: {} taxa x {} sites across {} markers",
        matrix.n_taxa(),
        matrix.n_chars(),
        matrix.markers.len()
    );
    Concatenation {
        matrix: Some(matrix),
        excluded,
    }
}

/// Marker id of an alignment file: its stem without a stage suffix.
pub fn marker_id_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy().to_string();
    let id = ALIGNMENT_SUFFIXES
        .iter()
        .find_map(|suffix| stem.strip_suffix(suffix))
        .unwrap_or(&stem);
    Some(id.to_string())
}

/// Load already aligned per-marker FASTA files from `dir` (sorted, non-recursive).
pub fn load_alignment_dir(dir: &Path) -> Result<Vec<MarkerSet>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| PipelineError::InputDirectory {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map_or(false, |ext| FASTA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();

    let mut sets: BTreeMap<String, MarkerSet> = BTreeMap::new();
    for path in paths {
        let Some(marker_id) = marker_id_from_path(&path) else {
            continue;
        };
        if sets.contains_key(&marker_id) {
            warn!("{} repeats marker {}; keeping the first file", path.display(), marker_id);
            continue;
        }
        let contents = std::fs::read(&path)?;
        let entries = fasta_io::read_entries(&contents).map_err(|e| PipelineError::InputDirectory {
            path: path.clone(),
            reason: format!("unparsable FASTA: {}", e),
        })?;

        let mut set = MarkerSet::new(marker_id.clone());
        for entry in entries {
            if !set.insert(entry.id.clone(), entry.sequence) {
                warn!("Duplicate taxon {} in {}; keeping the first", entry.id, path.display());
            }
        }
        sets.insert(marker_id, set);
    }
    let mut sets: Vec<MarkerSet> = sets.into_values().collect();
    ensure_unique_names(&mut sets);
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aligned(marker: &str, rows: &[(&str, &str)]) -> MarkerSet {
        let records = rows.iter().map(|(t, s)| (t.to_string(), s.to_string())).collect();
        MarkerSet::aligned(marker, records).unwrap()
    }

    #[test]
    fn test_missing_marker_is_gap_filled() {
        let coi = aligned("COI", &[("A", "ACGT"), ("B", "AC-T")]);
        let nd1 = aligned("ND1", &[("A", "GGG"), ("C", "TTT")]);

        let matrix = concatenate(vec![nd1, coi]).matrix.unwrap();
        assert_eq!(matrix.taxa, vec!["A", "B", "C"]);
        assert_eq!(matrix.markers, vec!["COI", "ND1"]);
        assert_eq!(matrix.blocks["ND1"], MarkerBlock { start: 4, width: 3 });
        assert_eq!(matrix.row("B"), Some("AC-T---"));
        assert_eq!(matrix.row("C"), Some("----TTT"));
        for taxon in &matrix.taxa {
            assert_eq!(matrix.row(taxon).unwrap().len(), matrix.n_chars());
        }
    }

    #[test]
    fn test_marker_order_changes_layout_not_content() {
        let a = aligned("ATP6", &[("X", "AAAA"), ("Y", "CCCC")]);
        let b = aligned("COI", &[("X", "GG")]);
        let forward = concatenate(vec![a.clone(), b.clone()]).matrix.unwrap();
        let backward = concatenate(vec![b, a]).matrix.unwrap();

        assert_eq!(forward.row("Y"), backward.row("Y"));
        for taxon in ["X", "Y"] {
            for marker in ["ATP6", "COI"] {
                assert_eq!(forward.cell(taxon, marker), backward.cell(taxon, marker));
            }
        }
        assert_eq!(forward.cell("Y", "COI"), Some("--"));
    }

    #[test]
    fn test_unequal_marker_is_excluded() {
        let mut raw = MarkerSet::new("ND5");
        raw.insert("A", "ACG");
        raw.insert("B", "ACGTT");
        let coi = aligned("COI", &[("A", "ACGT")]);

        let result = concatenate(vec![raw, coi]);
        assert_eq!(result.excluded.len(), 1);
        assert_eq!(result.excluded[0].marker_id, "ND5");
        let matrix = result.matrix.unwrap();
        assert_eq!(matrix.markers, vec!["COI"]);
        assert_eq!(matrix.taxa, vec!["A"]);
    }

    #[test]
    fn test_nothing_left_gives_no_matrix() {
        let mut empty_width = MarkerSet::new("ATP8");
        empty_width.insert("A", "");
        let result = concatenate(vec![empty_width]);
        assert!(result.matrix.is_none());
        assert_eq!(result.excluded.len(), 1);
    }

    #[test]
    fn test_nexus_layout() {
        let coi = aligned("COI", &[("Homo sapiens_NC_012920.1", "ACGT"), ("B", "AC-T")]);
        let nd1 = aligned("ATP synthase 8", &[("B", "GG")]);
        let matrix = concatenate(vec![coi, nd1]).matrix.unwrap();

        let mut out = Vec::new();
        matrix.write_nexus(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("#NEXUS\nBEGIN DATA;\nDIMENSIONS NTAX=2 NCHAR=6;\n"));
        assert!(text.contains("FORMAT DATATYPE=DNA GAP=- MISSING=?;\nMATRIX\n"));
        assert!(text.contains("'B'                        GGAC-T\n"));
        assert!(text.contains("'Homo sapiens_NC_012920.1' --ACGT\n"));
        assert!(text.contains("    CHARSET ATP_synthase_8 = 1-2;\n    CHARSET COI = 3-6;\nEND;\n"));
    }

    #[test]
    fn test_marker_id_from_alignment_file_name() {
        assert_eq!(marker_id_from_path(Path::new("x/COI_trimmed.fasta")).as_deref(), Some("COI"));
        assert_eq!(marker_id_from_path(Path::new("x/ND1_aligned.fa")).as_deref(), Some("ND1"));
        assert_eq!(marker_id_from_path(Path::new("x/rbcL.fasta")).as_deref(), Some("rbcL"));
    }

    #[test]
    fn test_load_alignment_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("COI_aligned.fasta"), ">A\nAC-T\n>B\nACGT\n").unwrap();
        std::fs::write(dir.path().join("ND1_trimmed.fasta"), ">A\nGG\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let sets = load_alignment_dir(dir.path()).unwrap();
        let ids: Vec<_> = sets.iter().map(|s| s.marker_id.as_str()).collect();
        assert_eq!(ids, vec!["COI", "ND1"]);
        assert_eq!(sets[0].get("A"), Some("AC-T"));
    }
}
