use super::artifacts::sanitize;
use crate::config::ToolSpec;
use crate::error::StageExecutionError;
use crate::fasta_io::{self, FastaEntry};
use crate::types::MarkerSet;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info};

/// Bytes of stderr kept in an exit-status error
const STDERR_TAIL: usize = 1000;

/// Result of a successful tool invocation
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub program: PathBuf,
    pub elapsed: Duration,
}

/// An external command-line collaborator (aligner, trimmer, tree builder)
#[derive(Debug, Clone)]
pub struct ExternalTool {
    spec: ToolSpec,
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

impl ExternalTool {
    pub fn new(spec: ToolSpec) -> Self {
        Self { spec }
    }

    pub fn name(&self) -> &str {
        &self.spec.program
    }

    /// First of `program` and its fallbacks found on `PATH`.
    pub fn resolve_program(&self) -> Result<PathBuf, StageExecutionError> {
        let candidates: Vec<String> = std::iter::once(self.spec.program.clone())
            .chain(self.spec.fallbacks.iter().cloned())
            .collect();
        let found = candidates.iter().find_map(|name| find_executable(name));
        found.ok_or(StageExecutionError::ToolNotFound { tried: candidates })
    }

    pub fn build_command(&self, program: &Path, threads: u32, input: &Path, output: &Path) -> Command {
        let mut command = Command::new(program);
        if let Some(flag) = &self.spec.threads_flag {
            command.arg(flag).arg(threads.to_string());
        }
        command.args(&self.spec.args);
        if let Some(flag) = &self.spec.input_flag {
            command.arg(flag);
        }
        command.arg(input);
        if let Some(flag) = &self.spec.output_flag {
            command.arg(flag).arg(output);
        }
        command
    }

    /// Run the tool on `input`, leaving its result at `output`.
    ///
    /// The child is killed if the timeout expires or the future is dropped.
    pub async fn run(
        &self,
        input: &Path,
        output: &Path,
        threads: u32,
        work_dir: &Path,
    ) -> Result<ToolRun, StageExecutionError> {
        let program = self.resolve_program()?;
        let name = self.spec.program.clone();
        let mut command = self.build_command(&program, threads, input, output);
        command
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {:?}", command.as_std());
        let started = Instant::now();
        let child = command.spawn().map_err(|source| StageExecutionError::Spawn {
            program: name.clone(),
            source,
        })?;

        let secs = self.spec.timeout_secs;
        let finished = tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output()).await;
        let result = match finished {
            Ok(result) => result?,
            Err(_) => return Err(StageExecutionError::Timeout { program: name, secs }),
        };

        if !result.status.success() {
            return Err(StageExecutionError::ExitStatus {
                program: name,
                code: result.status.code(),
                stderr: stderr_tail(&result.stderr),
            });
        }
        if self.spec.output_flag.is_none() {
            tokio::fs::write(output, &result.stdout).await?;
        }

        Ok(ToolRun {
            program,
            elapsed: started.elapsed(),
        })
    }

    /// Run the tool over a marker set inside a scoped temporary directory.
    ///
    /// The directory is removed on every exit path when `workdir` drops.
    pub async fn run_on_set(&self, set: &MarkerSet, threads: u32) -> Result<MarkerSet, StageExecutionError> {
        let workdir = tempfile::Builder::new().prefix("markerflow-").tempdir()?;
        let stem = sanitize(&set.marker_id);
        let input = workdir.path().join(format!("{}.fasta", stem));
        let output = workdir.path().join(format!("{}.out.fasta", stem));

        fasta_io::write_entries(&input, set.records.iter().map(|(t, s)| (t.as_str(), s.as_str())))?;
        let run = self.run(&input, &output, threads, workdir.path()).await?;

        let bytes = match tokio::fs::read(&output).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StageExecutionError::EmptyOutput {
                    program: self.name().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(StageExecutionError::EmptyOutput {
                program: self.name().to_string(),
            });
        }
        let entries = fasta_io::read_entries(&bytes)
            .map_err(|e| StageExecutionError::MalformedOutput(format!("{}: {}", self.name(), e)))?;

        let result = self.collect_output(set, entries)?;
        info!(
            "{} finished {} in {:.2}s ({} sequences, width {})",
            run.program.display(),
            set.marker_id,
            run.elapsed.as_secs_f64(),
            result.len(),
            result.width.unwrap_or(0)
        );
        Ok(result)
    }

    /// Check the tool returned exactly the input taxa at one shared width.
    fn collect_output(&self, input: &MarkerSet, entries: Vec<FastaEntry>) -> Result<MarkerSet, StageExecutionError> {
        if entries.is_empty() {
            return Err(StageExecutionError::EmptyOutput {
                program: self.name().to_string(),
            });
        }
        let mut records = BTreeMap::new();
        for entry in entries {
            if input.get(&entry.id).is_none() {
                return Err(StageExecutionError::MalformedOutput(format!(
                    "{} returned unknown taxon '{}'",
                    self.name(),
                    entry.id
                )));
            }
            if records.insert(entry.id.clone(), entry.sequence).is_some() {
                return Err(StageExecutionError::MalformedOutput(format!(
                    "{} returned taxon '{}' twice",
                    self.name(),
                    entry.id
                )));
            }
        }
        if records.len() != input.len() {
            return Err(StageExecutionError::MalformedOutput(format!(
                "{} returned {} of {} sequences",
                self.name(),
                records.len(),
                input.len()
            )));
        }
        MarkerSet::aligned(input.marker_id.clone(), records)
            .map_err(|e| StageExecutionError::MalformedOutput(format!("{}: {}", self.name(), e)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell_tool(script: &str) -> ExternalTool {
        ExternalTool::new(ToolSpec {
            program: "sh".to_string(),
            fallbacks: Vec::new(),
            args: vec!["-c".to_string(), script.to_string()],
            threads_flag: None,
            input_flag: None,
            output_flag: None,
            timeout_secs: 10,
        })
    }

    fn unaligned() -> MarkerSet {
        let mut set = MarkerSet::new("COI");
        set.insert("taxon_a", "ACGTAC");
        set.insert("taxon_b", "ACGT");
        set
    }

    #[test]
    fn test_command_layout() {
        let tool = ExternalTool::new(ToolSpec::trimal());
        let command = tool.build_command(Path::new("trimal"), 4, Path::new("in.fasta"), Path::new("out.fasta"));
        let args: Vec<_> = command.as_std().get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(args, vec!["-automated1", "-in", "in.fasta", "-out", "out.fasta"]);

        let tool = ExternalTool::new(ToolSpec::mafft());
        let command = tool.build_command(Path::new("mafft"), 4, Path::new("in.fasta"), Path::new("out.fasta"));
        let args: Vec<_> = command.as_std().get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(args, vec!["--thread", "4", "--auto", "--preservecase", "in.fasta"]);
    }

    #[test]
    fn test_missing_program_lists_candidates() {
        let tool = ExternalTool::new(ToolSpec::iqtree().with_program("definitely-not-a-real-tool-xyz"));
        match tool.resolve_program() {
            Err(StageExecutionError::ToolNotFound { tried }) => {
                assert_eq!(tried, vec!["definitely-not-a-real-tool-xyz"])
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stdout_becomes_output() {
        // pads every sequence to 6 columns with gaps
        let tool = shell_tool(r#"awk '/^>/ {print; next} {s=$0; while (length(s) < 6) s = s "-"; print s}' "$0""#);
        let aligned = tool.run_on_set(&unaligned(), 1).await.unwrap();
        assert_eq!(aligned.width, Some(6));
        assert_eq!(aligned.get("taxon_b"), Some("ACGT--"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_stage_error() {
        let tool = shell_tool("echo 'bad input' >&2; exit 3");
        let err = tool.run_on_set(&unaligned(), 1).await.unwrap_err();
        match err {
            StageExecutionError::ExitStatus { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "bad input");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_output_is_a_stage_error() {
        let tool = shell_tool("true");
        let err = tool.run_on_set(&unaligned(), 1).await.unwrap_err();
        assert!(matches!(err, StageExecutionError::EmptyOutput { .. }));
    }

    #[tokio::test]
    async fn test_unequal_output_is_malformed() {
        let tool = shell_tool(r#"cat "$0""#);
        let err = tool.run_on_set(&unaligned(), 1).await.unwrap_err();
        assert!(matches!(err, StageExecutionError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn test_timeout_kills_the_tool() {
        let mut spec = ToolSpec::mafft().with_program("sh");
        spec.args = vec!["-c".to_string(), "sleep 5".to_string()];
        spec.threads_flag = None;
        spec.timeout_secs = 1;
        let err = ExternalTool::new(spec).run_on_set(&unaligned(), 1).await.unwrap_err();
        assert!(matches!(err, StageExecutionError::Timeout { secs: 1, .. }));
    }
}
