//! Message-driven control protocol around the decode session
//!
//! One worker drives one playback session. Messages arrive one at a time
//! and are handled to completion before the next is considered: an init
//! builds the payload store and opens the engine, frame requests run the
//! per-frame pipeline, and the end message tears everything down for
//! good. Each handled message produces at most one event.

use crate::engine::{EngineBackend, EngineConfig};
use crate::session::{DecodeSession, FrameOutcome, StageTimings};
use crate::{Error, Result, Stage};
use log::{debug, error, info, warn};
use std::sync::Arc;
use vel_core::{read_sidecar, scan, PayloadStore};

/// Lifecycle of a worker, transitioned only by explicit control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    /// No session yet; only init does anything.
    Uninitialized,
    /// Session live; frame requests are processed.
    Running,
    /// Session live; frame requests are dropped.
    Paused,
    /// Torn down. Terminal: every further message is ignored.
    Ended,
}

/// One inbound control message.
///
/// Fields are optional; which ones are present decides the handling. The
/// pause field is applied first, then exactly one of init, ended, or a
/// frame request (`join_buffer`), in that precedence.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlMessage {
    /// Update the pause state.
    pub pause: Option<bool>,
    /// Start a session.
    pub init: bool,
    /// Raw elementary-stream bytes to scan (used when no sidecar is given).
    pub video: Option<Vec<u8>>,
    /// Pre-segmented sidecar container bytes.
    pub sidecar_data: Option<Vec<u8>>,
    /// Tear the session down.
    pub ended: bool,
    /// Decoded base picture bytes for a frame request.
    pub join_buffer: Option<Vec<u8>>,
    /// Base picture width in pixels.
    pub width: u32,
    /// Base picture height in pixels.
    pub height: u32,
    /// Frame number into the payload store.
    pub frame: usize,
    /// Set when the source changed; the request is stale and dropped.
    pub change: bool,
}

impl ControlMessage {
    /// Init from raw elementary-stream bytes.
    pub fn init(video: Vec<u8>) -> Self {
        Self {
            init: true,
            video: Some(video),
            ..Self::default()
        }
    }

    /// Init from a sidecar container.
    pub fn init_with_sidecar(sidecar: Vec<u8>) -> Self {
        Self {
            init: true,
            sidecar_data: Some(sidecar),
            ..Self::default()
        }
    }

    /// Set or clear pause.
    pub fn pause(flag: bool) -> Self {
        Self {
            pause: Some(flag),
            ..Self::default()
        }
    }

    /// Request enhancement of one frame.
    pub fn frame_request(picture: Vec<u8>, width: u32, height: u32, frame: usize) -> Self {
        Self {
            join_buffer: Some(picture),
            width,
            height,
            frame,
            ..Self::default()
        }
    }

    /// Tear the session down.
    pub fn end() -> Self {
        Self {
            ended: true,
            ..Self::default()
        }
    }
}

/// A successfully enhanced frame, handed back to the caller.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameEvent {
    /// Full-resolution picture bytes.
    pub full_data: Vec<u8>,
    /// Full-resolution width parsed from the payload.
    pub width: u32,
    /// Full-resolution height parsed from the payload.
    pub height: u32,
    /// Width of the base picture this frame was enhanced from.
    pub base_width: u32,
    /// Per-stage wall-clock timings.
    pub timings: StageTimings,
}

/// A failed init or frame request.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorEvent {
    /// Frame number the failure belongs to, for frame-scoped failures.
    pub frame: Option<usize>,
    /// The engine stage that failed, for stage-scoped failures.
    pub stage: Option<Stage>,
    /// Human-readable description.
    pub reason: String,
}

impl ErrorEvent {
    fn from_error(frame: Option<usize>, err: &Error) -> Self {
        let stage = match err {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        };
        Self {
            frame,
            stage,
            reason: err.to_string(),
        }
    }
}

/// One outbound event; a handled message produces at most one.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WorkerEvent {
    /// A frame was enhanced.
    Frame(FrameEvent),
    /// An init or frame request failed; any live session stays usable.
    Error(ErrorEvent),
    /// Teardown acknowledgment.
    Ended,
}

/// Message-driven decode worker for one playback session.
pub struct Worker {
    backend: Option<Arc<dyn EngineBackend>>,
    state: ControlState,
    session: Option<DecodeSession>,
}

impl Worker {
    /// Creates a worker over a ready engine backend.
    pub fn new(backend: Arc<dyn EngineBackend>) -> Self {
        Self {
            backend: Some(backend),
            state: ControlState::Uninitialized,
            session: None,
        }
    }

    /// Creates a worker with no engine backend yet; init fails until
    /// [`Worker::bind_backend`] provides one.
    pub fn unbound() -> Self {
        Self {
            backend: None,
            state: ControlState::Uninitialized,
            session: None,
        }
    }

    /// Binds the engine backend once the host has it available.
    pub fn bind_backend(&mut self, backend: Arc<dyn EngineBackend>) {
        self.backend = Some(backend);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Handles one control message and returns the event it produced,
    /// if any. Runs to completion before the caller can hand over the
    /// next message.
    pub fn handle(&mut self, msg: ControlMessage) -> Option<WorkerEvent> {
        if self.state == ControlState::Ended {
            return None;
        }

        if let Some(flag) = msg.pause {
            self.set_paused(flag);
        }

        if msg.init {
            self.init(msg.video, msg.sidecar_data)
        } else if msg.ended {
            self.teardown()
        } else if let Some(picture) = msg.join_buffer {
            self.frame_request(&picture, msg.width, msg.height, msg.frame, msg.change)
        } else {
            None
        }
    }

    fn set_paused(&mut self, flag: bool) {
        match self.state {
            ControlState::Running if flag => self.state = ControlState::Paused,
            ControlState::Paused if !flag => self.state = ControlState::Running,
            ControlState::Uninitialized => debug!("pause update before init, ignored"),
            _ => {}
        }
    }

    fn init(&mut self, video: Option<Vec<u8>>, sidecar: Option<Vec<u8>>) -> Option<WorkerEvent> {
        if self.session.is_some() {
            info!("re-init received, starting a fresh session");
            self.session = None;
            self.state = ControlState::Uninitialized;
        }

        match self.open_session(video, sidecar) {
            Ok(session) => {
                self.session = Some(session);
                self.state = ControlState::Running;
                None
            }
            Err(err) => {
                warn!("session init failed: {err}");
                Some(WorkerEvent::Error(ErrorEvent::from_error(None, &err)))
            }
        }
    }

    fn open_session(
        &self,
        video: Option<Vec<u8>>,
        sidecar: Option<Vec<u8>>,
    ) -> Result<DecodeSession> {
        let backend = self.backend.as_ref().ok_or(Error::AllocatorUnavailable)?;

        let store = match (sidecar, video) {
            (Some(bytes), _) => read_sidecar(&bytes)?,
            (None, Some(bytes)) => scan(&bytes),
            (None, None) => {
                warn!("init carried neither video nor sidecar bytes");
                PayloadStore::new()
            }
        };
        if store.is_empty() {
            warn!("no enhancement data; frames will pass through unenhanced");
        } else {
            info!("payload store ready with {} payloads", store.payload_count());
        }

        let engine = backend.open(&EngineConfig::default())?;
        DecodeSession::new(engine, store, &backend.heap())
    }

    fn frame_request(
        &mut self,
        picture: &[u8],
        width: u32,
        height: u32,
        frame: usize,
        change: bool,
    ) -> Option<WorkerEvent> {
        if change {
            debug!("source changed, dropping stale request for frame {frame}");
            return None;
        }
        if self.state == ControlState::Paused {
            return None;
        }
        let Some(session) = self.session.as_mut() else {
            warn!("frame request before init, dropped");
            return None;
        };

        match session.decode_frame(picture, width, height, frame) {
            Ok(FrameOutcome::Enhanced(enhanced)) => Some(WorkerEvent::Frame(FrameEvent {
                full_data: enhanced.data,
                width: enhanced.width,
                height: enhanced.height,
                base_width: width,
                timings: enhanced.timings,
            })),
            Ok(FrameOutcome::NoMoreData) => None,
            Err(err) => {
                error!("enhancing frame {frame} failed: {err}");
                Some(WorkerEvent::Error(ErrorEvent::from_error(Some(frame), &err)))
            }
        }
    }

    fn teardown(&mut self) -> Option<WorkerEvent> {
        // Dropping the session releases the native buffers and closes the
        // engine instance.
        self.session = None;
        self.state = ControlState::Ended;
        Some(WorkerEvent::Ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockBackend;
    use vel_core::write_sidecar;

    fn sidecar_bytes(payloads: Vec<Vec<u8>>) -> Vec<u8> {
        let store = PayloadStore::from_payloads(payloads);
        let mut bytes = Vec::new();
        write_sidecar(&store, &mut bytes).unwrap();
        bytes
    }

    fn worker_with(backend: MockBackend) -> Worker {
        Worker::new(Arc::new(backend))
    }

    fn running_worker(payloads: Vec<Vec<u8>>) -> Worker {
        let mut worker = worker_with(MockBackend::new(640, 360));
        let event = worker.handle(ControlMessage::init_with_sidecar(sidecar_bytes(payloads)));
        assert!(event.is_none());
        worker
    }

    fn request(frame: usize) -> ControlMessage {
        ControlMessage::frame_request(vec![0x40; 64], 8, 8, frame)
    }

    #[test]
    fn test_init_then_frame_produces_frame_event() {
        let mut worker = running_worker(vec![vec![0xaa; 30], vec![0xbb; 31]]);
        assert_eq!(worker.state(), ControlState::Running);

        let event = worker.handle(ControlMessage::frame_request(vec![1; 128], 16, 8, 2));

        let frame = match event {
            Some(WorkerEvent::Frame(frame)) => frame,
            other => panic!("expected a frame event, got {other:?}"),
        };
        assert_eq!(frame.width, 640);
        assert_eq!(frame.height, 360);
        assert_eq!(frame.base_width, 16);
        assert_eq!(frame.full_data.len(), {
            let size = 640 * 360;
            size + size / 4 * 2
        });
        assert!(frame.timings.total_ms >= 0.0);
    }

    #[test]
    fn test_frame_past_store_is_silent() {
        let mut worker = running_worker(vec![vec![0xaa; 30]]);

        assert!(worker.handle(request(2)).is_none());
    }

    #[test]
    fn test_scan_init_with_no_payloads_serves_only_sentinel() {
        let mut worker = worker_with(MockBackend::new(320, 180));
        // Plain bytes, no embedded enhancement units.
        let event = worker.handle(ControlMessage::init(vec![0x55; 4096]));
        assert!(event.is_none());
        assert_eq!(worker.state(), ControlState::Running);

        // Frame 1 runs past the sentinel-only store.
        assert!(worker.handle(request(1)).is_none());

        // Frame 0 resolves the sentinel and still runs the pipeline.
        let event = worker.handle(request(0));
        assert!(matches!(event, Some(WorkerEvent::Frame(_))));
    }

    #[test]
    fn test_pause_drops_requests_until_cleared() {
        let mut worker = running_worker(vec![vec![1; 8]]);

        assert!(worker.handle(ControlMessage::pause(true)).is_none());
        assert_eq!(worker.state(), ControlState::Paused);
        assert!(worker.handle(request(1)).is_none());

        assert!(worker.handle(ControlMessage::pause(false)).is_none());
        assert_eq!(worker.state(), ControlState::Running);
        assert!(matches!(
            worker.handle(request(1)),
            Some(WorkerEvent::Frame(_))
        ));
    }

    #[test]
    fn test_pause_rides_along_with_a_frame_request() {
        let mut worker = running_worker(vec![vec![1; 8]]);

        let mut msg = request(1);
        msg.pause = Some(true);
        // The pause field applies before the request is considered.
        assert!(worker.handle(msg).is_none());
        assert_eq!(worker.state(), ControlState::Paused);
    }

    #[test]
    fn test_change_flag_drops_request_even_while_running() {
        let mut worker = running_worker(vec![vec![1; 8]]);

        let mut msg = request(1);
        msg.change = true;
        assert!(worker.handle(msg).is_none());

        // The same request without the flag is served.
        assert!(matches!(
            worker.handle(request(1)),
            Some(WorkerEvent::Frame(_))
        ));
    }

    #[test]
    fn test_end_is_acknowledged_and_terminal() {
        let mut worker = running_worker(vec![vec![1; 8]]);

        let event = worker.handle(ControlMessage::end());
        assert!(matches!(event, Some(WorkerEvent::Ended)));
        assert_eq!(worker.state(), ControlState::Ended);

        // Everything after the end is ignored, including another end.
        assert!(worker.handle(ControlMessage::end()).is_none());
        assert!(worker
            .handle(ControlMessage::init_with_sidecar(sidecar_bytes(vec![vec![1]])))
            .is_none());
        assert!(worker.handle(request(1)).is_none());
    }

    #[test]
    fn test_end_without_session_still_acknowledges() {
        let mut worker = worker_with(MockBackend::new(64, 64));

        let event = worker.handle(ControlMessage::end());

        assert!(matches!(event, Some(WorkerEvent::Ended)));
        assert_eq!(worker.state(), ControlState::Ended);
    }

    #[test]
    fn test_frame_request_before_init_is_dropped() {
        let mut worker = worker_with(MockBackend::new(64, 64));

        assert!(worker.handle(request(1)).is_none());
        assert_eq!(worker.state(), ControlState::Uninitialized);
    }

    #[test]
    fn test_unbound_worker_reports_missing_allocator() {
        let mut worker = Worker::unbound();

        let event = worker.handle(ControlMessage::init(vec![0; 16]));

        let error = match event {
            Some(WorkerEvent::Error(error)) => error,
            other => panic!("expected an error event, got {other:?}"),
        };
        assert_eq!(error.frame, None);
        assert_eq!(error.stage, None);
        assert_eq!(worker.state(), ControlState::Uninitialized);
    }

    #[test]
    fn test_bind_backend_enables_init() {
        let mut worker = Worker::unbound();
        worker.bind_backend(Arc::new(MockBackend::new(640, 360)));

        let event = worker.handle(ControlMessage::init_with_sidecar(sidecar_bytes(vec![
            vec![2; 6],
        ])));

        assert!(event.is_none());
        assert_eq!(worker.state(), ControlState::Running);
    }

    #[test]
    fn test_malformed_sidecar_init_emits_error() {
        let mut worker = worker_with(MockBackend::new(64, 64));

        // Record declares 9 bytes, only 1 follows.
        let event = worker.handle(ControlMessage::init_with_sidecar(vec![
            0x09, 0x00, 0x00, 0x00, 0x7f,
        ]));

        let error = match event {
            Some(WorkerEvent::Error(error)) => error,
            other => panic!("expected an error event, got {other:?}"),
        };
        assert!(error.reason.contains("sidecar"));
        assert_eq!(worker.state(), ControlState::Uninitialized);
        assert!(worker.handle(request(1)).is_none());
    }

    #[test]
    fn test_failed_engine_open_emits_error() {
        let mut backend = MockBackend::new(64, 64);
        backend.fail_open = true;
        let mut worker = worker_with(backend);

        let event = worker.handle(ControlMessage::init_with_sidecar(sidecar_bytes(vec![
            vec![1],
        ])));

        assert!(matches!(event, Some(WorkerEvent::Error(_))));
        assert_eq!(worker.state(), ControlState::Uninitialized);
    }

    #[test]
    fn test_stage_failure_emits_error_event_with_stage() {
        let mut backend = MockBackend::new(640, 360);
        backend.fail_stage = Some(Stage::Base);
        let mut worker = worker_with(backend);
        worker.handle(ControlMessage::init_with_sidecar(sidecar_bytes(vec![
            vec![3; 12],
        ])));

        let event = worker.handle(request(1));

        let error = match event {
            Some(WorkerEvent::Error(error)) => error,
            other => panic!("expected an error event, got {other:?}"),
        };
        assert_eq!(error.frame, Some(1));
        assert_eq!(error.stage, Some(Stage::Base));
        // The session stays live for later frames.
        assert_eq!(worker.state(), ControlState::Running);
    }

    #[test]
    fn test_reinit_replaces_the_store() {
        let mut worker = running_worker(vec![vec![1; 4]]);
        assert!(worker.handle(request(2)).is_none());

        let event = worker.handle(ControlMessage::init_with_sidecar(sidecar_bytes(vec![
            vec![1; 4],
            vec![2; 4],
        ])));
        assert!(event.is_none());

        assert!(matches!(
            worker.handle(request(2)),
            Some(WorkerEvent::Frame(_))
        ));
    }

    #[test]
    fn test_pause_before_init_does_not_stick() {
        let mut worker = worker_with(MockBackend::new(640, 360));

        assert!(worker.handle(ControlMessage::pause(true)).is_none());
        worker.handle(ControlMessage::init_with_sidecar(sidecar_bytes(vec![
            vec![1; 4],
        ])));

        assert!(matches!(
            worker.handle(request(1)),
            Some(WorkerEvent::Frame(_))
        ));
    }
}
