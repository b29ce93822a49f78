use crate::error::Result;
use crate::frame::Frame;
use image::{ImageBuffer, Luma};
use imageproc::filter::filter3x3;
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Number of recent frames kept for sharpest-frame selection
pub const STABILIZATION_CAPACITY: usize = 10;

/// 4-connected Laplacian kernel used for the focus score
const LAPLACIAN_KERNEL: [i16; 9] = [0, 1, 0, 1, -4, 1, 0, 1, 0];

/// Bounded ring of recent raw frames with sharpness-based selection.
///
/// Owned exclusively by the capture task; nothing else reads it, so it
/// needs no locking. The frame that trips the motion detector is often
/// motion-blurred, so automatic captures persist the crispest frame from
/// this short window instead.
pub struct StabilizationBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl StabilizationBuffer {
    pub fn new() -> Self {
        Self::with_capacity(STABILIZATION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a frame, evicting the oldest once the buffer is full
    pub fn push(&mut self, frame: Frame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        trace!("Buffered frame {} for stabilization", frame.id);
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Return the buffered frame with the maximal focus score.
    ///
    /// Frames whose pixels cannot be decoded are skipped rather than
    /// failing the selection. Returns `None` for an empty buffer.
    pub fn select_sharpest(&self) -> Option<Frame> {
        let mut best: Option<(f64, &Frame)> = None;
        for frame in &self.frames {
            let score = match sharpness_score(frame) {
                Ok(score) => score,
                Err(e) => {
                    debug!("Skipping frame {} in sharpness scan: {}", frame.id, e);
                    continue;
                }
            };
            match best {
                Some((best_score, _)) if score <= best_score => {}
                _ => best = Some((score, frame)),
            }
        }

        best.map(|(score, frame)| {
            debug!(
                "Selected frame {} as sharpest of {} (score {:.2})",
                frame.id,
                self.frames.len(),
                score
            );
            frame.clone()
        })
    }
}

impl Default for StabilizationBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Focus score: variance of the Laplacian over the grayscale frame.
///
/// Higher values indicate a crisper image; a uniform frame scores 0.
pub fn sharpness_score(frame: &Frame) -> Result<f64> {
    let gray = frame.to_gray()?;
    let laplacian: ImageBuffer<Luma<i16>, Vec<i16>> = filter3x3(&gray, &LAPLACIAN_KERNEL);

    let count = (laplacian.width() * laplacian.height()) as f64;
    if count == 0.0 {
        return Ok(0.0);
    }

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for pixel in laplacian.pixels() {
        let value = pixel[0] as f64;
        sum += value;
        sum_sq += value * value;
    }

    let mean = sum / count;
    Ok(sum_sq / count - mean * mean)
}
