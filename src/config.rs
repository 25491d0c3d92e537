use crate::constants::{
    DEFAULT_THREADS, DEFAULT_THREADS_PER_JOB, DEFAULT_TOOL_TIMEOUT_SECS, ENV_ALIGNER, ENV_TREE, ENV_TRIMMER,
};
use crate::error::{PipelineError, Result};
use crate::types::{DataType, InputFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which optional stages run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageToggles {
    pub align: bool,
    pub trim: bool,
    pub tree: bool,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TOOL_TIMEOUT_SECS
}

/// How to invoke one external tool.
///
/// Arguments are laid out as
/// `program [threads_flag N] args.. [input_flag] INPUT [output_flag OUTPUT]`.
/// Without an `output_flag` the tool's stdout is taken as its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub program: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub threads_flag: Option<String>,
    #[serde(default)]
    pub input_flag: Option<String>,
    #[serde(default)]
    pub output_flag: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ToolSpec {
    /// `mafft --thread N --auto --preservecase INPUT > OUTPUT`
    pub fn mafft() -> Self {
        Self {
            program: "mafft".to_string(),
            fallbacks: Vec::new(),
            args: vec!["--auto".to_string(), "--preservecase".to_string()],
            threads_flag: Some("--thread".to_string()),
            input_flag: None,
            output_flag: None,
            timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }

    /// `trimal -automated1 -in INPUT -out OUTPUT`
    pub fn trimal() -> Self {
        Self {
            program: "trimal".to_string(),
            fallbacks: Vec::new(),
            args: vec!["-automated1".to_string()],
            threads_flag: None,
            input_flag: Some("-in".to_string()),
            output_flag: Some("-out".to_string()),
            timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }

    /// `iqtree2 -nt N -B 1000 -m MFP -redo -s MATRIX -pre PREFIX`, falling back to `iqtree`
    pub fn iqtree() -> Self {
        Self {
            program: "iqtree2".to_string(),
            fallbacks: vec!["iqtree".to_string()],
            args: ["-B", "1000", "-m", "MFP", "-redo"].iter().map(|s| s.to_string()).collect(),
            threads_flag: Some("-nt".to_string()),
            input_flag: Some("-s".to_string()),
            output_flag: Some("-pre".to_string()),
            timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
        }
    }

    /// Replace the program (and drop fallbacks), keeping the argument layout.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self.fallbacks.clear();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub data_type: DataType,
    pub format: InputFormat,
    /// Total thread budget shared by all concurrent work
    pub threads: usize,
    /// Threads handed to each external tool invocation
    pub threads_per_job: usize,
    pub benchmark: bool,
    /// Replacement synonym table
    pub synonyms: Option<PathBuf>,
    pub stages: StageToggles,
    pub aligner: ToolSpec,
    pub trimmer: ToolSpec,
    pub tree: ToolSpec,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::new(),
            output_dir: PathBuf::from("markerflow_output"),
            data_type: DataType::default(),
            format: InputFormat::default(),
            threads: DEFAULT_THREADS,
            threads_per_job: DEFAULT_THREADS_PER_JOB,
            benchmark: false,
            synonyms: None,
            stages: StageToggles::default(),
            aligner: ToolSpec::mafft(),
            trimmer: ToolSpec::trimal(),
            tree: ToolSpec::iqtree(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&config_content)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        Ok(config)
    }

    /// Apply `MARKERFLOW_ALIGNER` / `MARKERFLOW_TRIMMER` / `MARKERFLOW_TREE`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let overrides = [
            (ENV_ALIGNER, &mut self.aligner),
            (ENV_TRIMMER, &mut self.trimmer),
            (ENV_TREE, &mut self.tree),
        ];
        for (key, spec) in overrides {
            if let Some(program) = lookup(key).filter(|p| !p.trim().is_empty()) {
                *spec = spec.clone().with_program(program.trim());
            }
        }
    }

    /// Reject unusable settings before any work or output happens.
    pub fn validate(&self) -> Result<()> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(PipelineError::Configuration("an input directory is required".to_string()));
        }
        if self.stages.tree && !self.stages.trim {
            return Err(PipelineError::Configuration(
                "tree inference requires trimming to be enabled".to_string(),
            ));
        }
        if self.threads == 0 {
            return Err(PipelineError::Configuration("threads must be at least 1".to_string()));
        }
        if self.threads_per_job == 0 {
            return Err(PipelineError::Configuration("threads_per_job must be at least 1".to_string()));
        }

        let enabled = [
            ("aligner", self.stages.align, &self.aligner),
            ("trimmer", self.stages.trim, &self.trimmer),
            ("tree", self.stages.tree, &self.tree),
        ];
        for (name, on, spec) in enabled {
            if !on {
                continue;
            }
            if spec.program.trim().is_empty() {
                return Err(PipelineError::Configuration(format!("{} program must not be empty", name)));
            }
            if spec.timeout_secs == 0 {
                return Err(PipelineError::Configuration(format!("{} timeout must be positive", name)));
            }
        }
        Ok(())
    }

    pub fn effective_threads_per_job(&self) -> usize {
        self.threads_per_job.clamp(1, self.threads.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_input() -> Config {
        Config {
            input_dir: PathBuf::from("in"),
            ..Config::default()
        }
    }

    #[test]
    fn test_tree_without_trim_is_rejected() {
        let mut config = with_input();
        config.stages.tree = true;
        config.stages.align = true;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(msg) if msg.contains("trimming")));

        config.stages.trim = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threads_is_rejected() {
        let mut config = with_input();
        config.threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
input_dir = "data"
data_type = "cp"
threads = 2

[stages]
align = true

[aligner]
program = "/opt/mafft/bin/mafft"
args = ["--retree", "1"]
threads_flag = "--thread"
"#,
        )
        .unwrap();

        assert_eq!(config.data_type, DataType::Cp);
        assert_eq!(config.threads, 2);
        assert!(config.stages.align && !config.stages.trim);
        assert_eq!(config.aligner.args, vec!["--retree", "1"]);
        assert_eq!(config.aligner.timeout_secs, DEFAULT_TOOL_TIMEOUT_SECS);
        assert_eq!(config.trimmer, ToolSpec::trimal());
        assert_eq!(config.effective_threads_per_job(), 2);
    }

    #[test]
    fn test_env_overrides_replace_program() {
        let mut config = with_input();
        config.apply_overrides_from(|key| (key == ENV_TREE).then(|| "/usr/local/bin/iqtree3".to_string()));
        assert_eq!(config.tree.program, "/usr/local/bin/iqtree3");
        assert!(config.tree.fallbacks.is_empty());
        assert_eq!(config.tree.input_flag.as_deref(), Some("-s"));
        assert_eq!(config.aligner.program, "mafft");
    }
}
