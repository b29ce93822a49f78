use crate::classifier::MotionClassifier;
use crate::config::{DetectorConfig, SourceConfig, VigilConfig};
use crate::error::{Result, VigilError};
use crate::events::{Event, EventChannel, EventSender};
use crate::frame::Frame;
use crate::gate::CooldownGate;
use crate::source::{FrameSource, FrameSourceHandle};
use crate::stabilizer::StabilizationBuffer;
use crate::writer::{CaptureKind, CaptureWriter};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long stop() waits for the capture task before aborting it
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Idle interval while paused
const PAUSE_IDLE: Duration = Duration::from_millis(100);

/// Backoff after a failed frame read
const READ_FAILURE_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of the detector engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No capture task, settings unlocked
    Stopped,
    /// Capture task reading and analyzing frames
    Running,
    /// Capture task alive but idle, device still held
    Paused,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Stopped => "stopped",
            EngineState::Running => "running",
            EngineState::Paused => "paused",
        }
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of the engine counters.
///
/// `cooldown_remaining_seconds` is recomputed from the last automatic
/// capture at read time; the other counters only grow within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub state: EngineState,
    pub frames_read: u64,
    pub motions_detected: u64,
    pub captures_saved: u64,
    pub cooldown_remaining_seconds: u64,
}

/// State shared between the control surface and the capture task.
///
/// Critical sections only copy values, they never span I/O.
struct EngineShared {
    state: EngineState,
    detector: DetectorConfig,
    current_frame: Option<Frame>,
    manual_requested: bool,
    frames_read: u64,
    motions_detected: u64,
    captures_saved: u64,
    last_automatic: Option<Instant>,
}

impl EngineShared {
    fn new(detector: DetectorConfig) -> Self {
        Self {
            state: EngineState::Stopped,
            detector,
            current_frame: None,
            manual_requested: false,
            frames_read: 0,
            motions_detected: 0,
            captures_saved: 0,
            last_automatic: None,
        }
    }

    fn reset_run(&mut self) {
        self.current_frame = None;
        self.manual_requested = false;
        self.frames_read = 0;
        self.motions_detected = 0;
        self.captures_saved = 0;
        self.last_automatic = None;
    }
}

struct RunningTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Motion-triggered capture engine.
///
/// One engine owns at most one capture task. `start` opens the frame
/// source and spawns the task; `stop` cancels it and waits up to
/// [`STOP_JOIN_TIMEOUT`] before aborting. The source is released exactly
/// once per run, by the task itself, even when it is aborted.
pub struct DetectorEngine {
    source: Arc<dyn FrameSource>,
    source_config: SourceConfig,
    shared: Arc<Mutex<EngineShared>>,
    writer: Arc<CaptureWriter>,
    events: EventChannel,
    capture_task: tokio::sync::Mutex<Option<RunningTask>>,
}

impl DetectorEngine {
    pub async fn new(config: VigilConfig, source: Arc<dyn FrameSource>) -> Result<Self> {
        let events = EventChannel::new();
        let writer = Arc::new(CaptureWriter::new(&config.storage, events.sender()).await?);

        Ok(Self {
            source,
            source_config: config.source,
            shared: Arc::new(Mutex::new(EngineShared::new(config.detector))),
            writer,
            events,
            capture_task: tokio::sync::Mutex::new(None),
        })
    }

    /// Open the frame source and spawn the capture task.
    ///
    /// Returns `Ok(false)` without side effects when a task is already
    /// alive. A failed device open leaves the engine stopped.
    pub async fn start(&self) -> Result<bool> {
        let mut task_slot = self.capture_task.lock().await;

        let already_active = self.shared.lock().state != EngineState::Stopped;
        if already_active {
            debug!("start() ignored, detector already active");
            return Ok(false);
        }

        let device = self.source.open(self.source_config.index).await?;

        let detector = {
            let mut shared = self.shared.lock();
            shared.reset_run();
            shared.state = EngineState::Running;
            shared.detector.clone()
        };

        let cancel = CancellationToken::new();
        let fps = self.source_config.fps.max(1);
        let worker = CaptureWorker {
            guard: SourceGuard::new(device),
            detector,
            writer: Arc::clone(&self.writer),
            shared: Arc::clone(&self.shared),
            events: self.events.sender(),
            cancel: cancel.clone(),
            frame_interval: Duration::from_millis(1000 / fps as u64),
        };
        let handle = tokio::spawn(worker.run());
        *task_slot = Some(RunningTask { handle, cancel });

        self.events.sender().info("Detector started");
        info!("Detector engine started");
        Ok(true)
    }

    /// Stop the capture task and release the frame source.
    ///
    /// Safe to call at any time; a second stop is a no-op.
    pub async fn stop(&self) {
        let mut task_slot = self.capture_task.lock().await;

        let running = task_slot.take();
        let already_stopped = self.shared.lock().state == EngineState::Stopped;
        if running.is_none() && already_stopped {
            debug!("stop() ignored, detector already stopped");
            return;
        }

        if let Some(RunningTask { mut handle, cancel }) = running {
            cancel.cancel();
            match tokio::time::timeout(STOP_JOIN_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => debug!("Capture task completed cleanly"),
                Ok(Err(e)) => error!("Capture task join error: {}", e),
                Err(_) => {
                    warn!(
                        "Capture task did not stop within {:?}, aborting",
                        STOP_JOIN_TIMEOUT
                    );
                    handle.abort();
                }
            }
        }

        {
            let mut shared = self.shared.lock();
            shared.state = EngineState::Stopped;
            shared.current_frame = None;
            shared.manual_requested = false;
        }

        self.events.sender().info("Detector stopped");
        info!("Detector engine stopped");
    }

    /// Suspend frame reading without releasing the device
    pub fn pause(&self) {
        let transitioned = {
            let mut shared = self.shared.lock();
            if shared.state == EngineState::Running {
                shared.state = EngineState::Paused;
                true
            } else {
                false
            }
        };

        if transitioned {
            self.events.sender().info("Detector paused");
            info!("Detector engine paused");
        }
    }

    pub fn resume(&self) {
        let transitioned = {
            let mut shared = self.shared.lock();
            if shared.state == EngineState::Paused {
                shared.state = EngineState::Running;
                true
            } else {
                false
            }
        };

        if transitioned {
            self.events.sender().info("Detector resumed");
            info!("Detector engine resumed");
        }
    }

    /// Flag the current frame for persistence on the next loop iteration.
    ///
    /// Only honored while running; manual captures bypass debounce and
    /// cooldown and never advance the cooldown clock. Returns whether the
    /// request was accepted.
    pub fn request_manual_capture(&self) -> bool {
        let mut shared = self.shared.lock();
        if shared.state == EngineState::Running {
            shared.manual_requested = true;
            true
        } else {
            debug!(
                "Manual capture rejected while {}",
                shared.state.as_str()
            );
            false
        }
    }

    pub fn configure_sensitivity(&self, motion_threshold: u32) -> Result<()> {
        let mut shared = self.shared.lock();
        Self::ensure_stopped(&shared)?;
        shared.detector.motion_threshold = motion_threshold;
        info!("Motion threshold set to {}", motion_threshold);
        Ok(())
    }

    pub fn configure_compression(&self, jpeg_quality: u8, resolution: (u32, u32)) -> Result<()> {
        let mut shared = self.shared.lock();
        Self::ensure_stopped(&shared)?;
        shared.detector.jpeg_quality = jpeg_quality;
        shared.detector.target_resolution = resolution;
        info!(
            "Compression set to quality {} at {}x{}",
            jpeg_quality, resolution.0, resolution.1
        );
        Ok(())
    }

    pub fn configure_cooldown(&self, cooldown_seconds: u64) -> Result<()> {
        let mut shared = self.shared.lock();
        Self::ensure_stopped(&shared)?;
        shared.detector.cooldown_seconds = cooldown_seconds;
        info!("Cooldown set to {}s", cooldown_seconds);
        Ok(())
    }

    fn ensure_stopped(shared: &EngineShared) -> Result<()> {
        if shared.state == EngineState::Stopped {
            Ok(())
        } else {
            Err(VigilError::settings_locked(shared.state.as_str()))
        }
    }

    pub fn state(&self) -> EngineState {
        self.shared.lock().state
    }

    /// Snapshot of the settings the next run will use
    pub fn detector_config(&self) -> DetectorConfig {
        self.shared.lock().detector.clone()
    }

    /// Most recent frame read by the capture loop, if any
    pub fn current_frame(&self) -> Option<Frame> {
        self.shared.lock().current_frame.clone()
    }

    pub fn statistics(&self) -> Statistics {
        let shared = self.shared.lock();
        let cooldown = Duration::from_secs(shared.detector.cooldown_seconds);
        let cooldown_remaining_seconds = match shared.last_automatic {
            Some(last) => cooldown.saturating_sub(last.elapsed()).as_secs(),
            None => 0,
        };

        Statistics {
            state: shared.state,
            frames_read: shared.frames_read,
            motions_detected: shared.motions_detected,
            captures_saved: shared.captures_saved,
            cooldown_remaining_seconds,
        }
    }

    /// Pop the next pending event, waiting up to `timeout` when given
    pub async fn poll_event(&self, timeout: Option<Duration>) -> Option<Event> {
        self.events.poll(timeout).await
    }

    /// Producer handle for collaborators that report through this
    /// engine's event queue
    pub fn event_sender(&self) -> EventSender {
        self.events.sender()
    }

    pub async fn recent_history(&self, count: usize) -> Result<Vec<String>> {
        self.writer.recent_history(count).await
    }

    pub async fn recent_captures(&self, count: usize) -> Result<Vec<PathBuf>> {
        self.writer.recent_captures(count).await
    }
}

/// Releases the device handle exactly once, on drop if the task is
/// aborted before the normal release at loop exit.
struct SourceGuard {
    handle: Box<dyn FrameSourceHandle>,
    released: bool,
}

impl SourceGuard {
    fn new(handle: Box<dyn FrameSourceHandle>) -> Self {
        Self {
            handle,
            released: false,
        }
    }

    async fn read(&mut self) -> Result<Frame> {
        self.handle.read().await
    }

    fn release(&mut self) {
        if !self.released {
            self.handle.release();
            self.released = true;
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owns the per-run pipeline state inside the capture task
struct CaptureWorker {
    guard: SourceGuard,
    detector: DetectorConfig,
    writer: Arc<CaptureWriter>,
    shared: Arc<Mutex<EngineShared>>,
    events: EventSender,
    cancel: CancellationToken,
    frame_interval: Duration,
}

impl CaptureWorker {
    async fn run(mut self) {
        let mut classifier = MotionClassifier::new(self.detector.motion_threshold);
        let mut stabilizer = StabilizationBuffer::new();
        let mut gate = CooldownGate::new(
            self.detector.debounce_frame_count,
            Duration::from_secs(self.detector.cooldown_seconds),
        );

        info!(
            "Capture loop started at {} ms per frame",
            self.frame_interval.as_millis()
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let paused = self.shared.lock().state == EngineState::Paused;
            if paused {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(PAUSE_IDLE) => {}
                }
                continue;
            }

            let frame = match self.guard.read().await {
                Ok(frame) => frame,
                Err(e) => {
                    self.events.error(format!("Frame read failed: {}", e));
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(READ_FAILURE_BACKOFF) => {}
                    }
                    continue;
                }
            };

            self.process_frame(frame, &mut classifier, &mut stabilizer, &mut gate)
                .await;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.frame_interval) => {}
            }
        }

        self.guard.release();
        info!("Capture loop stopped");
    }

    async fn process_frame(
        &mut self,
        frame: Frame,
        classifier: &mut MotionClassifier,
        stabilizer: &mut StabilizationBuffer,
        gate: &mut CooldownGate,
    ) {
        {
            let mut shared = self.shared.lock();
            shared.frames_read += 1;
            shared.current_frame = Some(frame.clone());
        }
        stabilizer.push(frame.clone());

        match classifier.classify(&frame) {
            Ok(verdict) => {
                gate.observe(verdict.is_some());
                if let Some(area) = verdict {
                    self.shared.lock().motions_detected += 1;
                    debug!(area, frame_id = frame.id, "Motion detected");

                    if gate.automatic_permitted(Instant::now()) {
                        self.capture_automatic(stabilizer, gate).await;
                    }
                }
            }
            Err(e) => {
                self.events
                    .error(format!("Motion analysis failed: {}", e));
            }
        }

        let manual_pending = std::mem::take(&mut self.shared.lock().manual_requested);
        if manual_pending {
            let saved = self
                .writer
                .save(&frame, CaptureKind::Manual, &self.detector)
                .await;
            if saved.is_some() {
                self.shared.lock().captures_saved += 1;
            }
        }
    }

    async fn capture_automatic(
        &mut self,
        stabilizer: &mut StabilizationBuffer,
        gate: &mut CooldownGate,
    ) {
        let sharpest = match stabilizer.select_sharpest() {
            Some(frame) => frame,
            None => {
                self.events
                    .error("No decodable frame available for automatic capture");
                return;
            }
        };

        let saved = self
            .writer
            .save(&sharpest, CaptureKind::Automatic, &self.detector)
            .await;
        if saved.is_some() {
            let now = Instant::now();
            gate.mark_automatic(now);
            let mut shared = self.shared.lock();
            shared.captures_saved += 1;
            shared.last_automatic = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::source::{SyntheticScene, SyntheticSource};
    use std::path::Path;
    use tempfile::tempdir;

    fn test_config(dir: &Path, detector: DetectorConfig) -> VigilConfig {
        VigilConfig {
            detector,
            source: SourceConfig {
                index: 0,
                fps: 30,
                resolution: (160, 96),
            },
            storage: StorageConfig {
                capture_dir: dir.join("captures").to_string_lossy().to_string(),
                historial_file: "historial.txt".to_string(),
                plate_registry_file: "authorized_plates.json".to_string(),
                timezone: "UTC".to_string(),
            },
        }
    }

    fn quiet_detector() -> DetectorConfig {
        DetectorConfig {
            motion_threshold: 500,
            jpeg_quality: 75,
            target_resolution: (640, 480),
            cooldown_seconds: 5,
            debounce_frame_count: 3,
        }
    }

    async fn engine_with(
        dir: &Path,
        detector: DetectorConfig,
        source: Arc<SyntheticSource>,
    ) -> DetectorEngine {
        let erased: Arc<dyn FrameSource> = source;
        DetectorEngine::new(test_config(dir, detector), erased)
            .await
            .unwrap()
    }

    /// Drain every queued event without waiting
    async fn drain_events(engine: &DetectorEngine) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = engine.poll_event(None).await {
            events.push(event);
        }
        events
    }

    fn count_captures(events: &[Event]) -> usize {
        events
            .iter()
            .filter(|e| e.event_type() == "capture_saved")
            .count()
    }

    #[tokio::test]
    async fn test_start_twice_second_is_noop() {
        let dir = tempdir().unwrap();
        let source = Arc::new(SyntheticSource::flat(160, 96));
        let engine = engine_with(dir.path(), quiet_detector(), source.clone()).await;

        assert!(engine.start().await.unwrap());
        assert_eq!(engine.state(), EngineState::Running);
        assert!(!engine.start().await.unwrap());
        assert_eq!(source.open_count(), 1);

        engine.stop().await;
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_start_open_failure_stays_stopped() {
        let dir = tempdir().unwrap();
        let source = Arc::new(SyntheticSource::failing(160, 96));
        let engine = engine_with(dir.path(), quiet_detector(), source.clone()).await;

        let result = engine.start().await;
        assert!(result.is_err());
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(source.release_count(), 0);

        // A failed start leaves stop() a no-op
        engine.stop().await;
        assert_eq!(source.release_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_idempotent_releases_source_once() {
        let dir = tempdir().unwrap();
        let source = Arc::new(SyntheticSource::flat(160, 96));
        let engine = engine_with(dir.path(), quiet_detector(), source.clone()).await;

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.stop().await;
        engine.stop().await;

        assert_eq!(source.open_count(), 1);
        assert_eq!(source.release_count(), 1);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(engine.current_frame().is_none());
    }

    #[tokio::test]
    async fn test_pause_halts_reading_resume_continues() {
        let dir = tempdir().unwrap();
        let source = Arc::new(SyntheticSource::flat(160, 96));
        let engine = engine_with(dir.path(), quiet_detector(), source.clone()).await;

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        engine.pause();
        assert_eq!(engine.state(), EngineState::Paused);
        // Let any in-flight iteration drain before sampling the counter
        tokio::time::sleep(Duration::from_millis(100)).await;
        let paused_frames = engine.statistics().frames_read;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(engine.statistics().frames_read, paused_frames);

        engine.resume();
        assert_eq!(engine.state(), EngineState::Running);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(engine.statistics().frames_read > paused_frames);

        engine.stop().await;
        assert_eq!(source.release_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_while_paused_releases_source() {
        let dir = tempdir().unwrap();
        let source = Arc::new(SyntheticSource::flat(160, 96));
        let engine = engine_with(dir.path(), quiet_detector(), source.clone()).await;

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        engine.pause();
        engine.stop().await;

        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(source.release_count(), 1);
    }

    #[tokio::test]
    async fn test_manual_capture_only_while_running() {
        let dir = tempdir().unwrap();
        let source = Arc::new(SyntheticSource::flat(160, 96));
        let engine = engine_with(dir.path(), quiet_detector(), source.clone()).await;

        assert!(!engine.request_manual_capture());

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(engine.request_manual_capture());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let stats = engine.statistics();
        assert_eq!(stats.captures_saved, 1);
        // Manual captures never arm the cooldown clock
        assert_eq!(stats.cooldown_remaining_seconds, 0);

        engine.pause();
        assert!(!engine.request_manual_capture());

        engine.stop().await;

        let events = drain_events(&engine).await;
        assert_eq!(count_captures(&events), 1);
        let capture = events
            .iter()
            .find_map(|e| match e {
                Event::CaptureSaved(c) => Some(c.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(capture.kind, CaptureKind::Manual);
        assert!(capture.filename.starts_with("manual_"));
    }

    #[tokio::test]
    async fn test_configure_locked_while_running() {
        let dir = tempdir().unwrap();
        let source = Arc::new(SyntheticSource::flat(160, 96));
        let engine = engine_with(dir.path(), quiet_detector(), source).await;

        engine.configure_sensitivity(5000).unwrap();
        assert_eq!(engine.detector_config().motion_threshold, 5000);

        engine.start().await.unwrap();

        let err = engine.configure_sensitivity(1).unwrap_err();
        assert!(matches!(err, VigilError::SettingsLocked { .. }));
        assert!(engine.configure_compression(50, (320, 240)).is_err());
        assert!(engine.configure_cooldown(1).is_err());
        assert_eq!(engine.detector_config().motion_threshold, 5000);

        engine.pause();
        assert!(engine.configure_sensitivity(1).is_err());

        engine.stop().await;
        engine.configure_cooldown(1).unwrap();
        assert_eq!(engine.detector_config().cooldown_seconds, 1);
    }

    #[tokio::test]
    async fn test_motion_sequence_saves_exactly_one_capture() {
        let dir = tempdir().unwrap();
        // Two quiet frames, then a blob jumping between two spots on
        // every frame. Baseline updates each frame, so only movement
        // keeps the motion streak alive.
        let script = vec![
            SyntheticScene::flat(),
            SyntheticScene::flat(),
            SyntheticScene::blob_at(8, 30, 28),
            SyntheticScene::blob_at(72, 30, 28),
            SyntheticScene::blob_at(8, 30, 28),
            SyntheticScene::blob_at(72, 30, 28),
            SyntheticScene::blob_at(8, 30, 28),
        ];
        let source = Arc::new(SyntheticSource::scripted(160, 96, script));
        let engine = engine_with(dir.path(), quiet_detector(), source.clone()).await;

        engine.start().await.unwrap();
        // 7 scripted frames at ~33ms plus persistence slack
        tokio::time::sleep(Duration::from_millis(700)).await;
        engine.stop().await;

        let stats = engine.statistics();
        assert!(stats.motions_detected >= 5, "saw {} motions", stats.motions_detected);
        assert_eq!(stats.captures_saved, 1);

        let events = drain_events(&engine).await;
        assert_eq!(count_captures(&events), 1);
        let capture = events
            .iter()
            .find_map(|e| match e {
                Event::CaptureSaved(c) => Some(c.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(capture.kind, CaptureKind::Automatic);

        let history = engine.recent_history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].contains("automatic"));
        assert!(history[0].contains(&capture.filename));

        let files = engine.recent_captures(10).await.unwrap();
        assert_eq!(files.len(), 1);

        assert_eq!(source.release_count(), 1);
    }

    #[tokio::test]
    async fn test_read_failure_keeps_loop_alive() {
        let dir = tempdir().unwrap();
        let script = vec![
            SyntheticScene::flat(),
            SyntheticScene::ReadError,
            SyntheticScene::ReadError,
            SyntheticScene::flat(),
        ];
        let source = Arc::new(SyntheticSource::scripted(160, 96, script));
        let engine = engine_with(dir.path(), quiet_detector(), source.clone()).await;

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(engine.state(), EngineState::Running);
        let stats = engine.statistics();
        assert!(stats.frames_read >= 2, "read {} frames", stats.frames_read);

        engine.stop().await;

        let events = drain_events(&engine).await;
        let read_errors = events
            .iter()
            .filter(|e| e.event_type() == "error" && e.description().contains("read failed"))
            .count();
        assert_eq!(read_errors, 2);
        assert_eq!(source.release_count(), 1);
    }

    #[tokio::test]
    async fn test_current_frame_tracks_latest_read() {
        let dir = tempdir().unwrap();
        let source = Arc::new(SyntheticSource::flat(160, 96));
        let engine = engine_with(dir.path(), quiet_detector(), source).await;

        assert!(engine.current_frame().is_none());

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        let frame = engine.current_frame().expect("loop should publish frames");
        assert_eq!((frame.width, frame.height), (160, 96));

        engine.stop().await;
        assert!(engine.current_frame().is_none());
    }

    #[tokio::test]
    async fn test_statistics_reset_on_restart() {
        let dir = tempdir().unwrap();
        let source = Arc::new(SyntheticSource::flat(160, 96));
        let engine = engine_with(dir.path(), quiet_detector(), source.clone()).await;

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        engine.stop().await;
        assert!(engine.statistics().frames_read > 0);

        engine.start().await.unwrap();
        let early = engine.statistics().frames_read;
        assert!(early <= 2, "counter carried over: {}", early);
        engine.stop().await;

        assert_eq!(source.open_count(), 2);
        assert_eq!(source.release_count(), 2);
    }
}
