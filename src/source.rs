use crate::error::{Result, VigilError};
use crate::frame::{Frame, FrameFormat};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Contract for a camera-like frame producer.
///
/// The engine owns at most one opened handle at a time, for the lifetime of
/// one running period. Handles are never shared across engine instances.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Open the device at the given index.
    ///
    /// A failure here is fatal to engine startup; no handle is left behind.
    async fn open(&self, index: u32) -> Result<Box<dyn FrameSourceHandle>>;
}

/// An opened frame producer, exclusively owned by one capture run.
#[async_trait]
pub trait FrameSourceHandle: Send {
    /// Read the next frame. Failures are transient; the caller retries
    /// after a short backoff.
    async fn read(&mut self) -> Result<Frame>;

    /// Release the device. Idempotent and infallible; called exactly once
    /// per successful open by the engine, including on abnormal stop.
    fn release(&mut self);
}

/// One scripted frame for the synthetic source.
#[derive(Debug, Clone, Copy)]
pub enum SyntheticScene {
    /// Uniform frame at the given gray level
    Flat { level: u8 },
    /// Uniform background with one bright square at (x, y)
    Blob {
        level: u8,
        x: u32,
        y: u32,
        side: u32,
        brightness: u8,
    },
    /// Simulated transient device fault
    ReadError,
}

impl SyntheticScene {
    pub fn flat() -> Self {
        Self::Flat { level: 32 }
    }

    pub fn blob_at(x: u32, y: u32, side: u32) -> Self {
        Self::Blob {
            level: 32,
            x,
            y,
            side,
            brightness: 224,
        }
    }
}

/// In-process frame source producing scripted RGB24 frames.
///
/// Used by the demo binary and the test suite. The script plays once and
/// then holds the final scene, or cycles when constructed with `cycling`.
/// Open and release calls are counted so tests can assert handle hygiene.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    script: Vec<SyntheticScene>,
    cycle: bool,
    fail_open: bool,
    opens: Arc<AtomicU32>,
    releases: Arc<AtomicU32>,
}

impl SyntheticSource {
    /// Source that plays the script once, then repeats the final scene
    pub fn scripted(width: u32, height: u32, script: Vec<SyntheticScene>) -> Self {
        Self {
            width,
            height,
            script,
            cycle: false,
            fail_open: false,
            opens: Arc::new(AtomicU32::new(0)),
            releases: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Source that loops through the script forever
    pub fn cycling(width: u32, height: u32, script: Vec<SyntheticScene>) -> Self {
        Self {
            cycle: true,
            ..Self::scripted(width, height, script)
        }
    }

    /// Source pointing at a static scene; never reports motion after bootstrap
    pub fn flat(width: u32, height: u32) -> Self {
        Self::scripted(width, height, vec![SyntheticScene::flat()])
    }

    /// Source whose open() always fails, for startup error paths
    pub fn failing(width: u32, height: u32) -> Self {
        Self {
            fail_open: true,
            ..Self::scripted(width, height, vec![SyntheticScene::flat()])
        }
    }

    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn release_count(&self) -> u32 {
        self.releases.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn open(&self, index: u32) -> Result<Box<dyn FrameSourceHandle>> {
        if self.fail_open {
            return Err(VigilError::source(format!(
                "Synthetic device {} configured to fail open",
                index
            )));
        }

        self.opens.fetch_add(1, Ordering::Relaxed);
        info!(
            "Opened synthetic source {} ({}x{}, {} scripted scenes)",
            index,
            self.width,
            self.height,
            self.script.len()
        );

        Ok(Box::new(SyntheticHandle {
            width: self.width,
            height: self.height,
            script: self.script.clone(),
            cycle: self.cycle,
            cursor: 0,
            next_id: 0,
            released: false,
            releases: Arc::clone(&self.releases),
        }))
    }
}

pub struct SyntheticHandle {
    width: u32,
    height: u32,
    script: Vec<SyntheticScene>,
    cycle: bool,
    cursor: usize,
    next_id: u64,
    released: bool,
    releases: Arc<AtomicU32>,
}

impl SyntheticHandle {
    fn next_scene(&mut self) -> SyntheticScene {
        if self.script.is_empty() {
            return SyntheticScene::flat();
        }
        let scene = self.script[self.cursor.min(self.script.len() - 1)];
        if self.cursor + 1 < self.script.len() {
            self.cursor += 1;
        } else if self.cycle {
            self.cursor = 0;
        }
        scene
    }

    fn render(&self, scene: SyntheticScene) -> Vec<u8> {
        let (level, blob) = match scene {
            SyntheticScene::Flat { level } => (level, None),
            SyntheticScene::Blob {
                level,
                x,
                y,
                side,
                brightness,
            } => (level, Some((x, y, side, brightness))),
            SyntheticScene::ReadError => (0, None),
        };

        let mut data = vec![level; (self.width * self.height * 3) as usize];
        if let Some((bx, by, side, brightness)) = blob {
            let x_end = (bx + side).min(self.width);
            let y_end = (by + side).min(self.height);
            for y in by.min(self.height)..y_end {
                for x in bx.min(self.width)..x_end {
                    let idx = ((y * self.width + x) * 3) as usize;
                    data[idx] = brightness;
                    data[idx + 1] = brightness;
                    data[idx + 2] = brightness;
                }
            }
        }
        data
    }
}

#[async_trait]
impl FrameSourceHandle for SyntheticHandle {
    async fn read(&mut self) -> Result<Frame> {
        if self.released {
            return Err(VigilError::source("Read from released synthetic handle"));
        }

        let scene = self.next_scene();
        if matches!(scene, SyntheticScene::ReadError) {
            return Err(VigilError::source("Synthetic transient read failure"));
        }

        let data = self.render(scene);
        let id = self.next_id;
        self.next_id += 1;

        Ok(Frame::new(
            id,
            SystemTime::now(),
            data,
            self.width,
            self.height,
            FrameFormat::Rgb24,
        ))
    }

    fn release(&mut self) {
        if self.released {
            debug!("Synthetic handle already released");
            return;
        }
        self.released = true;
        self.releases.fetch_add(1, Ordering::Relaxed);
        debug!("Synthetic handle released");
    }
}
