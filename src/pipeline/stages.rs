use super::artifacts::ArtifactLayout;
use super::external::ExternalTool;
use crate::error::StageExecutionError;
use crate::types::{MarkerSet, MarkerState, StageName, StageResult, StageStatus};
use async_trait::async_trait;
use metrics::{counter, histogram};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// One optional transformation applied to a marker's sequence set
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    fn enabled(&self) -> bool {
        true
    }

    /// Produce the replacement set. Must not mutate `set`.
    async fn apply(&self, set: &MarkerSet, threads: u32) -> Result<MarkerSet, StageExecutionError>;
}

/// Stage backed by an external command-line tool
pub struct ExternalStage {
    name: StageName,
    enabled: bool,
    tool: ExternalTool,
}

impl ExternalStage {
    pub fn new(name: StageName, enabled: bool, tool: ExternalTool) -> Self {
        Self { name, enabled, tool }
    }
}

#[async_trait]
impl Stage for ExternalStage {
    fn name(&self) -> StageName {
        self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn apply(&self, set: &MarkerSet, threads: u32) -> Result<MarkerSet, StageExecutionError> {
        self.tool.run_on_set(set, threads).await
    }
}

fn record_stage_metrics(stage: StageName, status: StageStatus, elapsed: Duration) {
    counter!("markerflow_stage_runs_total", "stage" => stage.to_string(), "status" => status.to_string())
        .increment(1);
    if status != StageStatus::Skipped {
        histogram!("markerflow_stage_duration_seconds", "stage" => stage.to_string())
            .record(elapsed.as_secs_f64());
    }
}

/// Where one marker ended up after its pipeline
#[derive(Debug, Clone)]
pub struct MarkerOutcome {
    pub marker_id: String,
    pub state: MarkerState,
    /// Final set, `None` when the marker failed
    pub set: Option<MarkerSet>,
    pub results: Vec<StageResult>,
    /// Stage outputs written under the output directory
    pub artifacts: Vec<(StageName, PathBuf)>,
}

impl MarkerOutcome {
    pub fn failure(&self) -> Option<&StageResult> {
        self.results.iter().find(|r| r.status == StageStatus::Failed)
    }

    pub fn elapsed_in(&self, stage: StageName) -> Duration {
        self.results
            .iter()
            .filter(|r| r.stage_name == stage)
            .map(|r| r.elapsed)
            .sum()
    }
}

/// Linear Raw -> Aligned -> Trimmed state machine for one marker
#[derive(Clone)]
pub struct MarkerPipeline {
    stages: Vec<Arc<dyn Stage>>,
    threads: u32,
    layout: Option<ArtifactLayout>,
}

impl MarkerPipeline {
    /// Stages run in the given order; callers pass align before trim.
    pub fn new(stages: Vec<Arc<dyn Stage>>, threads: u32) -> Self {
        Self {
            stages,
            threads,
            layout: None,
        }
    }

    pub fn with_layout(mut self, layout: ArtifactLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    fn state_after(stage: StageName, current: MarkerState) -> MarkerState {
        match stage {
            StageName::Align => MarkerState::Aligned,
            StageName::Trim => MarkerState::Trimmed,
            StageName::Extract => current,
        }
    }

    #[instrument(skip(self, set), fields(marker_id = %set.marker_id))]
    pub async fn run(&self, set: MarkerSet) -> MarkerOutcome {
        let marker_id = set.marker_id.clone();
        let mut state = MarkerState::Raw;
        let mut current = set;
        let mut results = vec![StageResult::ok(StageName::Extract, current.clone(), Duration::ZERO)];
        let mut artifacts = Vec::new();

        for stage in &self.stages {
            let name = stage.name();
            if !stage.enabled() {
                record_stage_metrics(name, StageStatus::Skipped, Duration::ZERO);
                results.push(StageResult::skipped(name, current.clone()));
                continue;
            }

            let started = Instant::now();
            let applied = stage.apply(&current, self.threads).await;
            let written = match (applied, &self.layout) {
                (Ok(output), Some(layout)) => layout
                    .persist_marker(name, &output)
                    .await
                    .map(|path| (output, Some(path)))
                    .map_err(StageExecutionError::from),
                (Ok(output), None) => Ok((output, None)),
                (Err(e), _) => Err(e),
            };
            let elapsed = started.elapsed();

            match written {
                Ok((output, path)) => {
                    record_stage_metrics(name, StageStatus::Ok, elapsed);
                    info!("{} {}: {} sequences, width {}", name, marker_id, output.len(), output.width.unwrap_or(0));
                    if let Some(path) = path {
                        artifacts.push((name, path));
                    }
                    state = Self::state_after(name, state);
                    results.push(StageResult::ok(name, output.clone(), elapsed));
                    current = output;
                }
                Err(e) => {
                    record_stage_metrics(name, StageStatus::Failed, elapsed);
                    warn!("{} failed for {}: {}", name, marker_id, e);
                    results.push(StageResult::failed(&marker_id, name, e.to_string(), elapsed));
                    return MarkerOutcome {
                        marker_id,
                        state: MarkerState::Failed,
                        set: None,
                        results,
                        artifacts,
                    };
                }
            }
        }

        MarkerOutcome {
            marker_id,
            state,
            set: Some(current),
            results,
            artifacts,
        }
    }
}
