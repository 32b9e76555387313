pub mod config;
pub mod error;
pub mod executor;
pub mod host;
pub mod mitm;
pub mod navigator;
pub mod pipeline;
pub mod project_dir;
pub mod report;
pub mod tools;

pub use config::{ConfigProvider, Settings};
pub use error::ApklabError;
pub use executor::{CancelToken, Executor, ProcessResult, ProcessRunner, ToolInvocation};
pub use host::Host;
pub use pipeline::{DecodeOptions, Orchestrator, PipelineReport};
