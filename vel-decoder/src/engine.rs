//! Interface to the external enhancement engine
//!
//! The engine itself lives behind a foreign-function boundary; this module
//! only fixes the capability the rest of the crate consumes: opening an
//! instance, reaching the heap its buffers must live in, and the four
//! per-frame stage calls. Stage calls return the engine's raw status code,
//! where `0` is success and anything else is a stage-specific failure.

use crate::buffer::{EngineHeap, NativeBuffer};
use crate::Result;
use std::sync::Arc;

/// Options applied when opening an engine instance.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Produce full output surfaces rather than bare residuals.
    pub generate_surfaces: bool,
    /// Let the engine parallelize internally.
    pub parallel_decode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generate_surfaces: true,
            parallel_decode: false,
        }
    }
}

/// One open enhancement-decoding instance.
///
/// A session calls the four stages in order for every frame: parse,
/// decode-base, upscale, decode-high. Implementations are expected to keep
/// per-instance state between calls (the parse result feeds the later
/// stages) and are dropped to close the instance.
pub trait EnhancementEngine: Send {
    /// Parses one frame's enhancement payload and writes the parsed stream
    /// width, stream height, and the two layer-enablement flags into the
    /// 32-bit out-buffers.
    #[allow(clippy::too_many_arguments)]
    fn parse(
        &mut self,
        payload: &NativeBuffer,
        payload_len: usize,
        offset: u32,
        stream_width: &mut NativeBuffer,
        stream_height: &mut NativeBuffer,
        enable_base: &mut NativeBuffer,
        enable_high: &mut NativeBuffer,
    ) -> i32;

    /// Applies the base-layer correction in place to the staged base
    /// picture.
    fn decode_base(&mut self, base: &mut NativeBuffer, base_width: u32) -> i32;

    /// Upscales the corrected base picture into the full-resolution buffer.
    fn upscale(
        &mut self,
        base: &NativeBuffer,
        base_width: u32,
        base_height: u32,
        full: &mut NativeBuffer,
        full_width: u32,
        full_height: u32,
    ) -> i32;

    /// Applies the high-layer residuals in place to the full-resolution
    /// picture.
    fn decode_high(&mut self, full: &mut NativeBuffer, full_width: u32) -> i32;
}

/// Provider of engine instances and of the heap their buffers require.
pub trait EngineBackend: Send + Sync {
    /// The heap in which buffers shared with this backend's engines live.
    fn heap(&self) -> Arc<dyn EngineHeap>;

    /// Opens a new engine instance.
    fn open(&self, config: &EngineConfig) -> Result<Box<dyn EnhancementEngine>>;
}
