/// File extensions read as GenBank flat files
pub const GENBANK_EXTENSIONS: &[&str] = &["gb", "gbk", "gbff", "genbank"];
/// File extensions read as FASTA
pub const FASTA_EXTENSIONS: &[&str] = &["fasta", "fa", "fas", "fna", "fsa"];

/// Gap character used for absent markers in the supermatrix
pub const GAP: char = '-';

// Output layout
pub const RAW_MARKERS_DIR: &str = "01-raw_markers";
pub const ALIGNED_MARKERS_DIR: &str = "02-aligned_markers";
pub const TRIMMED_MARKERS_DIR: &str = "03-trimmed_markers";
pub const PHYLOGENY_DIR: &str = "04-phylogeny";
pub const LOGS_DIR: &str = "logs";
pub const SUPERMATRIX_FILE: &str = "supermatrix.nex";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const BENCHMARK_FILE: &str = "benchmark.tsv";
pub const TREE_PREFIX: &str = "markerflow_tree";

// Defaults
pub const DEFAULT_THREADS: usize = 8;
pub const DEFAULT_THREADS_PER_JOB: usize = 4;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 3600;

/// Suffixes stripped from alignment file stems to recover the marker id
pub const ALIGNMENT_SUFFIXES: &[&str] = &["_aligned_trimmed", "_trimmed", "_aligned"];

// Environment overrides for tool programs
pub const ENV_ALIGNER: &str = "MARKERFLOW_ALIGNER";
pub const ENV_TRIMMER: &str = "MARKERFLOW_TRIMMER";
pub const ENV_TREE: &str = "MARKERFLOW_TREE";
