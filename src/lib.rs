pub mod api;
pub mod chunker;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod monitoring;
pub mod security;

pub use chunker::{chunk, chunk_text, Chunk, ChunkError, ChunkParams, ChunkUnit, Language};
pub use config::ApiConfig;
pub use error::ApiError;
