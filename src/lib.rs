pub mod benchmark;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod fasta_io;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod types;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineController, RunSummary};
