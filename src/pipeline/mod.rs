pub mod artifacts;
pub mod concat;
pub mod controller;
pub mod external;
pub mod scheduler;
pub mod splitter;
pub mod stages;
pub mod tree;

pub use artifacts::{ArtifactLayout, Manifest};
pub use concat::{concatenate, load_alignment_dir, ConcatenatedMatrix, Concatenation, TaxonIndex};
pub use controller::{PipelineController, RunSummary};
pub use external::ExternalTool;
pub use scheduler::WorkerPool;
pub use splitter::MarkerSplitter;
pub use stages::{ExternalStage, MarkerOutcome, MarkerPipeline, Stage};
pub use tree::TreeInference;
