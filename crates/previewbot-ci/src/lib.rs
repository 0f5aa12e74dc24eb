//! previewbot CI - the preview run pipeline
//!
//! Provides the orchestrator that:
//! - Gates the run on branch policy and changed files
//! - Deploys to Vercel with retries and records GitHub deployment statuses
//! - Leaves one sticky comment describing the outcome
//! - Exposes step outputs for later workflow steps

pub mod credentials;
pub mod outputs;
pub mod pipeline;

pub use credentials::FallbackCommentStore;
pub use outputs::{format_output, RunOutputs};
pub use pipeline::{PipelineDeps, PipelineResult, PreviewPipeline};
