pub mod chunker;
pub mod normalizer;
pub mod pipeline;

pub use chunker::{chunk, ChunkProfile};
pub use normalizer::{normalize, NormalizeOptions};
pub use pipeline::{IngestOutcome, IngestionPipeline};
