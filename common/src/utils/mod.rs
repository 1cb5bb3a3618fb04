pub mod batch;
pub mod config;
pub mod embedding;
pub mod token_count;
