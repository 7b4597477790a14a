//! Per-frame decode orchestration
//!
//! A session owns one engine instance, the payload store built at init,
//! and the long-lived native buffers the engine reads and writes. Each
//! frame runs the four engine stages in order: parse, decode-base,
//! upscale, decode-high. Frames are strictly sequential; nothing here
//! retries a failed stage.

use crate::buffer::{EngineHeap, NativeBuffer};
use crate::engine::EnhancementEngine;
use crate::{Error, Result, Stage};
use log::debug;
use std::sync::Arc;
use std::time::Instant;
use vel_core::PayloadStore;

/// Initial capacity of the payload staging buffer.
const PAYLOAD_STAGING_CAPACITY: usize = 1024 * 1024;

/// Initial capacity of the base and full picture buffers, sized for a
/// 640x360 8-bit picture with headroom.
const PICTURE_STAGING_CAPACITY: usize = 640 * 360 * 2;

/// Wall-clock milliseconds spent in each engine stage for one frame.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StageTimings {
    pub total_ms: f64,
    pub parse_ms: f64,
    pub base_ms: f64,
    pub upscale_ms: f64,
    pub high_ms: f64,
}

/// A successfully enhanced frame.
#[derive(Debug, Clone)]
pub struct EnhancedFrame {
    /// Full-resolution width parsed from the payload.
    pub width: u32,
    /// Full-resolution height parsed from the payload.
    pub height: u32,
    /// Full-resolution picture: luma plane followed by the two chroma
    /// planes.
    pub data: Vec<u8>,
    /// Per-stage wall-clock timings.
    pub timings: StageTimings,
}

/// Outcome of one frame request against the session.
#[derive(Debug)]
pub enum FrameOutcome {
    /// The frame was enhanced.
    Enhanced(EnhancedFrame),
    /// The store holds no payload for this frame; the caller falls back
    /// to the unenhanced picture.
    NoMoreData,
}

/// The session's long-lived native buffers.
///
/// All of them are allocated once at init in the engine's heap; the
/// staging buffers then grow as frames demand and are released together
/// when the session drops.
struct SessionBuffers {
    payload: NativeBuffer,
    base: NativeBuffer,
    full: NativeBuffer,
    stream_width: NativeBuffer,
    stream_height: NativeBuffer,
    enable_base: NativeBuffer,
    enable_high: NativeBuffer,
}

impl SessionBuffers {
    fn allocate(heap: &Arc<dyn EngineHeap>) -> Result<Self> {
        Ok(Self {
            payload: NativeBuffer::zeroed(Arc::clone(heap), PAYLOAD_STAGING_CAPACITY)?,
            base: NativeBuffer::zeroed(Arc::clone(heap), PICTURE_STAGING_CAPACITY)?,
            full: NativeBuffer::zeroed(Arc::clone(heap), PICTURE_STAGING_CAPACITY)?,
            stream_width: NativeBuffer::zeroed_u32(Arc::clone(heap), 1)?,
            stream_height: NativeBuffer::zeroed_u32(Arc::clone(heap), 1)?,
            enable_base: NativeBuffer::zeroed_u32(Arc::clone(heap), 1)?,
            enable_high: NativeBuffer::zeroed_u32(Arc::clone(heap), 1)?,
        })
    }
}

/// One playback session's decode state.
pub struct DecodeSession {
    engine: Box<dyn EnhancementEngine>,
    store: PayloadStore,
    buffers: SessionBuffers,
}

impl DecodeSession {
    /// Creates a session around an open engine instance and a built
    /// payload store, allocating the long-lived buffers in `heap`.
    pub fn new(
        engine: Box<dyn EnhancementEngine>,
        store: PayloadStore,
        heap: &Arc<dyn EngineHeap>,
    ) -> Result<Self> {
        Ok(Self {
            engine,
            store,
            buffers: SessionBuffers::allocate(heap)?,
        })
    }

    /// The payload store backing this session.
    pub fn store(&self) -> &PayloadStore {
        &self.store
    }

    /// Enhances one frame: looks up its payload, stages the inputs, and
    /// runs the four engine stages in order.
    ///
    /// A frame number past the store ends with [`FrameOutcome::NoMoreData`]
    /// and touches neither the buffers nor the engine. A failing stage is
    /// fatal for this frame only; the session stays usable.
    pub fn decode_frame(
        &mut self,
        base_picture: &[u8],
        base_width: u32,
        base_height: u32,
        frame: usize,
    ) -> Result<FrameOutcome> {
        let Some(payload) = self.store.get(frame) else {
            debug!("no enhancement payload for frame {frame}, skipping");
            return Ok(FrameOutcome::NoMoreData);
        };
        let payload_len = payload.len();

        let total_start = Instant::now();

        self.buffers.base.overwrite(base_picture)?;
        self.buffers.payload.overwrite(payload)?;

        let parse_start = Instant::now();
        let status = self.engine.parse(
            &self.buffers.payload,
            payload_len,
            0,
            &mut self.buffers.stream_width,
            &mut self.buffers.stream_height,
            &mut self.buffers.enable_base,
            &mut self.buffers.enable_high,
        );
        if status != 0 {
            return Err(Error::Stage {
                stage: Stage::Parse,
                status,
            });
        }
        let parse_ms = ms_since(parse_start);

        let base_start = Instant::now();
        let status = self.engine.decode_base(&mut self.buffers.base, base_width);
        if status != 0 {
            return Err(Error::Stage {
                stage: Stage::Base,
                status,
            });
        }
        let base_ms = ms_since(base_start);

        let full_width = self.buffers.stream_width.read_u32(0);
        let full_height = self.buffers.stream_height.read_u32(0);
        // Luma plane plus two quarter-size chroma planes.
        let mut full_size = full_width as usize * full_height as usize;
        full_size += full_size / 4 * 2;
        self.buffers.full.grow_to(full_size)?;

        let upscale_start = Instant::now();
        let status = self.engine.upscale(
            &self.buffers.base,
            base_width,
            base_height,
            &mut self.buffers.full,
            full_width,
            full_height,
        );
        if status != 0 {
            return Err(Error::Stage {
                stage: Stage::Upscale,
                status,
            });
        }
        let upscale_ms = ms_since(upscale_start);

        let high_start = Instant::now();
        let status = self.engine.decode_high(&mut self.buffers.full, full_width);
        if status != 0 {
            return Err(Error::Stage {
                stage: Stage::High,
                status,
            });
        }
        let high_ms = ms_since(high_start);

        let timings = StageTimings {
            total_ms: ms_since(total_start),
            parse_ms,
            base_ms,
            upscale_ms,
            high_ms,
        };

        Ok(FrameOutcome::Enhanced(EnhancedFrame {
            width: full_width,
            height: full_height,
            data: self.buffers.full.as_slice().to_vec(),
            timings,
        }))
    }
}

fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
