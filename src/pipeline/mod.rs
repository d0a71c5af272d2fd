pub mod metrics;
pub mod news;
pub mod orchestrator;
pub mod prepare;
pub mod render;
pub mod stage;
pub mod state;
pub mod summarize;
pub mod visualize;

pub use orchestrator::{Pipeline, PipelineBuilder};
pub use prepare::DatasetSummary;
pub use render::RenderedArtifact;
pub use stage::{Stage, StageName};
pub use state::{PipelineState, StageRecord, StageStatus};
