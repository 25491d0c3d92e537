pub mod fasta;
pub mod genbank;

use crate::constants::{FASTA_EXTENSIONS, GENBANK_EXTENSIONS};
use crate::diagnostics::Diagnostic;
use crate::error::{ExtractionError, PipelineError, Result};
use crate::types::{InputFormat, RecordFormat, SequenceRecord};
use metrics::counter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// An input file and the format it will be parsed as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    pub format: RecordFormat,
}

/// Guess a file's format from its extension.
pub fn detect_format(path: &Path) -> Option<RecordFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if GENBANK_EXTENSIONS.contains(&ext.as_str()) {
        Some(RecordFormat::GenBank)
    } else if FASTA_EXTENSIONS.contains(&ext.as_str()) {
        Some(RecordFormat::Fasta)
    } else {
        None
    }
}

/// List the input directory (non-recursive, sorted) and assign a format to each file.
pub async fn discover_inputs(dir: &Path, declared: InputFormat) -> Result<Vec<InputFile>> {
    let input_error = |e: std::io::Error| PipelineError::InputDirectory {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(input_error)?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(input_error)? {
        if entry.file_type().await?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let inputs = paths
        .into_iter()
        .filter_map(|path| {
            let hidden = path
                .file_name()
                .map_or(true, |n| n.to_string_lossy().starts_with('.'));
            let format = match declared {
                _ if hidden => None,
                InputFormat::Auto => detect_format(&path),
                InputFormat::Genbank => Some(RecordFormat::GenBank),
                InputFormat::Fasta => Some(RecordFormat::Fasta),
            };
            if format.is_none() {
                debug!("Ignoring {}: not a recognised sequence file", path.display());
            }
            format.map(|format| InputFile { path, format })
        })
        .collect();
    Ok(inputs)
}

/// What one input file contributed: its records plus features skipped along the way.
#[derive(Debug, Default)]
pub struct ExtractedFile {
    pub records: Vec<SequenceRecord>,
    pub skipped: Vec<Diagnostic>,
}

/// Parse already-loaded file contents.
pub fn extract_contents(input: &InputFile, contents: &[u8]) -> std::result::Result<ExtractedFile, ExtractionError> {
    match input.format {
        RecordFormat::Fasta => fasta::extract_records(&input.path, contents).map(|records| ExtractedFile {
            records,
            skipped: Vec::new(),
        }),
        RecordFormat::GenBank => genbank::extract_records(&input.path, contents).map(|extraction| ExtractedFile {
            records: extraction.records,
            skipped: extraction.skipped,
        }),
    }
}

/// Read one file asynchronously and parse it on the blocking pool.
#[instrument(skip(input), fields(file = %input.path.display()))]
pub async fn extract_file(input: InputFile) -> std::result::Result<ExtractedFile, ExtractionError> {
    let contents = tokio::fs::read(&input.path)
        .await
        .map_err(|e| ExtractionError::new(&input.path, format!("read failed: {}", e)))?;

    let path = input.path.clone();
    let outcome = tokio::task::spawn_blocking(move || extract_contents(&input, &contents))
        .await
        .map_err(|e| ExtractionError::new(&path, format!("parser task failed: {}", e)))?;

    match &outcome {
        Ok(file) => {
            counter!("markerflow_records_extracted_total").increment(file.records.len() as u64);
            info!("Extracted {} sequences from {}", file.records.len(), path.display());
        }
        Err(_) => counter!("markerflow_files_failed_total").increment(1),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("a/NC_012920.gb")), Some(RecordFormat::GenBank));
        assert_eq!(detect_format(Path::new("a/sample.GBK")), Some(RecordFormat::GenBank));
        assert_eq!(detect_format(Path::new("a/sample.fas")), Some(RecordFormat::Fasta));
        assert_eq!(detect_format(Path::new("a/notes.txt")), None);
    }

    #[tokio::test]
    async fn test_discover_inputs_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.fasta"), ">x\nA\n").unwrap();
        fs::write(dir.path().join("a.gb"), "").unwrap();
        fs::write(dir.path().join("readme.md"), "").unwrap();
        fs::write(dir.path().join(".hidden.fasta"), "").unwrap();

        let inputs = discover_inputs(dir.path(), InputFormat::Auto).await.unwrap();
        let names: Vec<_> = inputs
            .iter()
            .map(|i| i.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.gb", "b.fasta"]);

        let declared = discover_inputs(dir.path(), InputFormat::Fasta).await.unwrap();
        assert_eq!(declared.len(), 3);
        assert!(declared.iter().all(|i| i.format == RecordFormat::Fasta));
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_input_error() {
        let err = discover_inputs(Path::new("/definitely/not/here"), InputFormat::Auto)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InputDirectory { .. }));
    }

    #[tokio::test]
    async fn test_extract_file_reports_failure_with_file_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.gb");
        fs::write(&path, "not a genbank file\n").unwrap();

        let err = extract_file(InputFile { path: path.clone(), format: RecordFormat::GenBank })
            .await
            .unwrap_err();
        assert_eq!(err.file, path);
    }
}
