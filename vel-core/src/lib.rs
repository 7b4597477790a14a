//! VEL Core Library
//!
//! This library provides payload ingestion for the VEL (Video Enhancement
//! Layer) decode pipeline: the in-stream SEI scanner, the sidecar container
//! format, and the frame-indexed payload store both of them produce.

pub mod scanner;
pub mod sidecar;
pub mod store;

pub use scanner::scan;
pub use sidecar::{read_sidecar, write_sidecar};
pub use store::PayloadStore;

/// Result type for vel-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for vel-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sidecar record at offset {offset} declares {declared} bytes but only {available} remain")]
    MalformedSidecar {
        offset: usize,
        declared: usize,
        available: usize,
    },
}
