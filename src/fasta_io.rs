//! Thin helpers over `bio::io::fasta` shared by extraction, stages and artifacts.

use bio::io::fasta;
use std::io;
use std::path::Path;

/// One FASTA entry with the full header line (id and description joined by a space).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaEntry {
    pub id: String,
    pub header: String,
    pub sequence: String,
}

/// Parse every record from in-memory FASTA text.
///
/// Whitespace inside sequence lines is dropped and residues are upper-cased.
pub fn read_entries(contents: &[u8]) -> io::Result<Vec<FastaEntry>> {
    let reader = fasta::Reader::new(contents);
    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let header = match record.desc() {
            Some(desc) => format!("{} {}", record.id(), desc),
            None => record.id().to_string(),
        };
        let sequence: String = String::from_utf8_lossy(record.seq())
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        entries.push(FastaEntry {
            id: record.id().to_string(),
            header,
            sequence,
        });
    }
    Ok(entries)
}

/// Write `(id, sequence)` pairs as FASTA to `path`.
pub fn write_entries<'a, I>(path: &Path, entries: I) -> io::Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let file = std::fs::File::create(path)?;
    let mut writer = fasta::Writer::new(file);
    for (id, sequence) in entries {
        writer.write(id, None, sequence.as_bytes())?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiline_records_are_joined() {
        let text = b">atp6_S1 atp6 ATP synthase F0 subunit 6\nacgt\nACGT\n>S2\nTT\n";
        let entries = read_entries(text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "atp6_S1");
        assert_eq!(entries[0].header, "atp6_S1 atp6 ATP synthase F0 subunit 6");
        assert_eq!(entries[0].sequence, "ACGTACGT");
        assert_eq!(entries[1].header, "S2");
    }

    #[test]
    fn test_text_without_header_is_rejected() {
        assert!(read_entries(b"ACGT\n").is_err());
    }
}
