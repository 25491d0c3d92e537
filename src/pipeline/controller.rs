use super::artifacts::{ArtifactKind, ArtifactLayout, Manifest};
use super::concat::concatenate;
use super::external::ExternalTool;
use super::scheduler::{join_all, WorkerPool};
use super::splitter::MarkerSplitter;
use super::stages::{ExternalStage, MarkerPipeline, Stage};
use super::tree::TreeInference;
use crate::benchmark::{Benchmark, BenchmarkStep};
use crate::config::Config;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticsReport};
use crate::error::{PipelineError, Result};
use crate::extract::{discover_inputs, extract_file};
use crate::normalize::{GeneNormalizer, Nomenclature};
use crate::types::StageName;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// What a completed run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub output_dir: PathBuf,
    pub files_scanned: usize,
    pub files_failed: usize,
    pub records: usize,
    pub markers: usize,
    pub included_markers: Vec<String>,
    pub taxa: usize,
    pub sites: usize,
    pub supermatrix: Option<PathBuf>,
    pub tree_file: Option<PathBuf>,
    pub diagnostics: DiagnosticsReport,
}

impl RunSummary {
    pub fn excluded_markers(&self) -> &BTreeMap<String, String> {
        &self.diagnostics.excluded_markers
    }
}

/// Top-level driver: extraction, per-marker stages, concatenation, tree.
pub struct PipelineController {
    config: Config,
    nomenclature: Arc<dyn Nomenclature>,
}

impl PipelineController {
    /// Validates the configuration and input directory. Nothing is written on error.
    pub fn new(config: Config, nomenclature: Arc<dyn Nomenclature>) -> Result<Self> {
        config.validate()?;
        if !config.input_dir.is_dir() {
            return Err(PipelineError::InputDirectory {
                path: config.input_dir.clone(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self { config, nomenclature })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn stages(&self) -> Vec<Arc<dyn Stage>> {
        let align: Arc<dyn Stage> = Arc::new(ExternalStage::new(
            StageName::Align,
            self.config.stages.align,
            ExternalTool::new(self.config.aligner.clone()),
        ));
        let trim: Arc<dyn Stage> = Arc::new(ExternalStage::new(
            StageName::Trim,
            self.config.stages.trim,
            ExternalTool::new(self.config.trimmer.clone()),
        ));
        vec![align, trim]
    }

    #[instrument(skip(self), fields(input = %self.config.input_dir.display()))]
    pub async fn run(&self) -> Result<RunSummary> {
        let config = &self.config;
        let mut bench = Benchmark::new(config.benchmark);
        let mut report = DiagnosticsReport::default();
        let pool = WorkerPool::new(config.threads);
        bench.start(BenchmarkStep::Total);

        // Extraction: every file parses concurrently; results are consumed in file order
        bench.start(BenchmarkStep::Extract);
        let inputs = discover_inputs(&config.input_dir, config.format).await?;
        info!("📂 Found {} input files in {}", inputs.len(), config.input_dir.display());
        let handles = inputs
            .iter()
            .cloned()
            .map(|input| pool.submit(1, extract_file(input)))
            .collect();
        let extracted = join_all(handles).await?;
        bench.stop(BenchmarkStep::Extract);

        bench.start(BenchmarkStep::Split);
        let normalizer = GeneNormalizer::new(self.nomenclature.clone(), config.data_type);
        let mut splitter = MarkerSplitter::new();
        let mut records = 0;
        for outcome in extracted {
            match outcome {
                Ok(file) => {
                    records += file.records.len();
                    report.extend(file.skipped);
                    let (normalized, diagnostics) = normalizer.normalize_file(file.records);
                    report.extend(diagnostics);
                    splitter.extend(normalized);
                }
                Err(e) => {
                    warn!("{}", e);
                    report.file_failed(&e.file, e.reason.clone());
                }
            }
        }
        if records == 0 {
            error!("No records extracted from {}", config.input_dir.display());
            return Err(PipelineError::NoRecords {
                input_dir: config.input_dir.clone(),
            });
        }

        std::fs::create_dir_all(&config.output_dir)?;
        let layout = ArtifactLayout::new(std::fs::canonicalize(&config.output_dir)?);
        layout.create()?;
        let mut manifest = Manifest::new();

        let (marker_sets, duplicates) = splitter.finish();
        report.extend(duplicates);
        for set in &marker_sets {
            let path = layout.persist_marker(StageName::Extract, set).await?;
            manifest.add(ArtifactKind::RawMarker, layout.root(), &path)?;
        }
        let marker_count = marker_sets.len();
        info!("🧬 {} records split into {} markers", records, marker_count);
        bench.stop(BenchmarkStep::Split);

        // Marker dispatch: each set is complete before its task starts
        let stages_enabled = config.stages.align || config.stages.trim;
        let threads = pool.job_cost(config.effective_threads_per_job());
        let cost = if stages_enabled { threads } else { 1 };
        let pipeline = MarkerPipeline::new(self.stages(), threads).with_layout(layout.clone());
        let handles = marker_sets
            .into_iter()
            .map(|set| {
                let pipeline = pipeline.clone();
                pool.submit(cost, async move { pipeline.run(set).await })
            })
            .collect();
        let outcomes = join_all(handles).await?;

        let mut align_time = Duration::ZERO;
        let mut trim_time = Duration::ZERO;
        let mut finished = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            align_time += outcome.elapsed_in(StageName::Align);
            trim_time += outcome.elapsed_in(StageName::Trim);
            for (stage, path) in &outcome.artifacts {
                manifest.add(ArtifactKind::from(*stage), layout.root(), path)?;
            }
            let failure = outcome
                .failure()
                .map(|r| format!("{} failed: {}", r.stage_name, r.diagnostics));
            match outcome.set {
                Some(set) => finished.push(set),
                None => report.marker_excluded(
                    DiagnosticKind::StageExecutionError,
                    &outcome.marker_id,
                    failure.unwrap_or_else(|| "stage failed".to_string()),
                ),
            }
        }
        if config.stages.align {
            bench.record(BenchmarkStep::Align, align_time);
        }
        if config.stages.trim {
            bench.record(BenchmarkStep::Trim, trim_time);
        }

        // Barrier passed: every marker task is terminal
        bench.start(BenchmarkStep::Concatenate);
        let concatenation = concatenate(finished);
        for excluded in &concatenation.excluded {
            report.marker_excluded(
                DiagnosticKind::WidthInconsistencyError,
                &excluded.marker_id,
                excluded.to_string(),
            );
        }
        let (supermatrix, included_markers, taxa, sites) = match &concatenation.matrix {
            Some(matrix) => {
                let path = layout.supermatrix_path();
                matrix.write_nexus_file(&path)?;
                manifest.add(ArtifactKind::Supermatrix, layout.root(), &path)?;
                (Some(path), matrix.markers.clone(), matrix.n_taxa(), matrix.n_chars())
            }
            None => {
                warn!("No markers left to concatenate");
                (None, Vec::new(), 0, 0)
            }
        };
        bench.stop(BenchmarkStep::Concatenate);

        let mut tree_file = None;
        if config.stages.tree {
            match &supermatrix {
                Some(matrix_path) => {
                    bench.start(BenchmarkStep::Tree);
                    let budget = pool.budget();
                    let inference = TreeInference::new(ExternalTool::new(config.tree.clone()), budget);
                    let matrix_path = matrix_path.clone();
                    let prefix = layout.tree_prefix();
                    let result = pool
                        .submit(budget, async move { inference.run(&matrix_path, &prefix).await })
                        .await
                        .map_err(|e| PipelineError::Task(e.to_string()))??;
                    bench.stop(BenchmarkStep::Tree);
                    match result {
                        Ok(artifacts) => {
                            for file in &artifacts.files {
                                manifest.add(ArtifactKind::Tree, layout.root(), file)?;
                            }
                            tree_file = Some(artifacts.tree_file);
                        }
                        Err(e) => {
                            error!("Tree inference failed: {}", e);
                            report.push(Diagnostic::new(DiagnosticKind::TreeInferenceError, "tree", e.to_string()));
                        }
                    }
                }
                None => report.push(Diagnostic::new(
                    DiagnosticKind::TreeInferenceError,
                    "tree",
                    "no supermatrix to infer a tree from",
                )),
            }
        }

        let diagnostics_path = layout.diagnostics_path();
        std::fs::write(&diagnostics_path, report.to_json()?)?;
        manifest.add(ArtifactKind::Diagnostics, layout.root(), &diagnostics_path)?;
        manifest.write(&layout.manifest_path())?;

        bench.stop(BenchmarkStep::Total);
        if let Err(e) = bench.save(&layout.benchmark_path(), &config.input_dir, inputs.len()) {
            error!("Failed to save benchmark: {}", e);
        }

        info!(
            "✅ Run {} finished: {} markers included, {} excluded",
            manifest.run_id,
            included_markers.len(),
            report.excluded_markers.len()
        );
        Ok(RunSummary {
            run_id: manifest.run_id,
            output_dir: layout.root().to_path_buf(),
            files_scanned: inputs.len(),
            files_failed: report.failed_files.len(),
            records,
            markers: marker_count,
            included_markers,
            taxa,
            sites,
            supermatrix,
            tree_file,
            diagnostics: report,
        })
    }
}
