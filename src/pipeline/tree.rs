use super::external::ExternalTool;
use crate::error::StageExecutionError;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Tree inference over the finished supermatrix
pub struct TreeInference {
    tool: ExternalTool,
    threads: u32,
}

/// Files produced by a successful tree run
#[derive(Debug, Clone)]
pub struct TreeArtifacts {
    pub tree_file: PathBuf,
    pub files: Vec<PathBuf>,
}

impl TreeInference {
    pub fn new(tool: ExternalTool, threads: u32) -> Self {
        Self { tool, threads }
    }

    /// Run once on `matrix`. Success needs exit status 0 and `<prefix>.treefile`.
    #[instrument(skip(self), fields(program = %self.tool.name()))]
    pub async fn run(&self, matrix: &Path, prefix: &Path) -> Result<TreeArtifacts, StageExecutionError> {
        let work_dir = prefix.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(work_dir).await?;
        info!("Starting tree inference with {} threads", self.threads);

        let run = self.tool.run(matrix, prefix, self.threads, work_dir).await?;

        let tree_file = PathBuf::from(format!("{}.treefile", prefix.display()));
        if !tree_file.is_file() {
            return Err(StageExecutionError::MalformedOutput(format!(
                "{} exited 0 but {} was not written",
                self.tool.name(),
                tree_file.display()
            )));
        }

        let files = prefixed_files(prefix)?;
        info!(
            "Tree inference finished in {:.1}s: {}",
            run.elapsed.as_secs_f64(),
            tree_file.display()
        );
        Ok(TreeArtifacts { tree_file, files })
    }
}

/// Files next to `prefix` whose names start with `<prefix>.`, sorted
fn prefixed_files(prefix: &Path) -> std::io::Result<Vec<PathBuf>> {
    let dir = prefix.parent().unwrap_or_else(|| Path::new("."));
    let stem = match prefix.file_name() {
        Some(name) => format!("{}.", name.to_string_lossy()),
        None => return Ok(Vec::new()),
    };
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map_or(false, |n| n.to_string_lossy().starts_with(&stem))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ToolSpec;

    fn fake_iqtree(script: &str) -> ExternalTool {
        let mut spec = ToolSpec::iqtree().with_program("sh");
        spec.threads_flag = None;
        spec.args = vec!["-c".to_string(), script.to_string()];
        spec.timeout_secs = 10;
        ExternalTool::new(spec)
    }

    #[tokio::test]
    async fn test_tree_file_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let matrix = dir.path().join("supermatrix.nex");
        std::fs::write(&matrix, "#NEXUS\n").unwrap();
        let prefix = dir.path().join("04-phylogeny").join("markerflow_tree");

        // sh -c SCRIPT -s MATRIX -pre PREFIX: $0=-s $1=MATRIX $2=-pre $3=PREFIX
        let writes = fake_iqtree(r#"echo '(A,B);' > "$3.treefile"; echo log > "$3.log""#);
        let artifacts = TreeInference::new(writes, 2).run(&matrix, &prefix).await.unwrap();
        assert!(artifacts.tree_file.ends_with("markerflow_tree.treefile"));
        assert_eq!(artifacts.files.len(), 2);

        let silent = fake_iqtree("true");
        std::fs::remove_file(&artifacts.tree_file).unwrap();
        let err = TreeInference::new(silent, 2).run(&matrix, &prefix).await.unwrap_err();
        assert!(matches!(err, StageExecutionError::MalformedOutput(_)));
    }
}
