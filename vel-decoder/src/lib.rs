//! VEL Decoder Library
//!
//! This library provides the native side of the VEL (Video Enhancement
//! Layer) decode pipeline: buffers shared with the external enhancement
//! engine, the engine capability traits, the per-frame decode session,
//! and the message-driven worker that drives a whole playback session.

pub mod buffer;
pub mod engine;
pub mod session;
pub mod worker;

pub use buffer::{EngineHeap, NativeBuffer, SystemHeap};
pub use engine::{EngineBackend, EngineConfig, EnhancementEngine};
pub use session::{DecodeSession, EnhancedFrame, FrameOutcome, StageTimings};
pub use worker::{ControlMessage, ControlState, ErrorEvent, FrameEvent, Worker, WorkerEvent};

use std::fmt;

/// Result type for vel-decoder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for vel-decoder operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("VEL core error: {0}")]
    Core(#[from] vel_core::Error),

    #[error("no engine backend bound; native buffers cannot be allocated")]
    AllocatorUnavailable,

    #[error("engine heap refused an allocation of {size} bytes")]
    AllocationFailed { size: usize },

    #[error("enhancement engine could not be opened")]
    EngineOpenFailed,

    #[error("enhancement engine {stage} stage failed (status {status})")]
    Stage { stage: Stage, status: i32 },
}

/// The four engine stages, in per-frame execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    Parse,
    Base,
    Upscale,
    High,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Parse => "parse",
            Stage::Base => "base",
            Stage::Upscale => "upscale",
            Stage::High => "high",
        };
        f.write_str(name)
    }
}
