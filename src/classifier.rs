use crate::error::Result;
use crate::frame::Frame;
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::{
    contrast::threshold,
    distance_transform::Norm,
    filter::gaussian_blur_f32,
    morphology::dilate,
    region_labelling::{connected_components, Connectivity},
};
use tracing::debug;

/// Gaussian sigma applied before differencing to suppress sensor noise
const BLUR_SIGMA: f32 = 3.5;
/// Per-pixel difference cutoff for the binary motion mask
const DIFF_THRESHOLD: u8 = 25;
/// Structuring element radius for each dilation pass
const DILATE_RADIUS: u8 = 1;

/// Frame-differencing motion detector.
///
/// The baseline is replaced with the current frame on every iteration, which
/// keeps the detector adaptive to slow lighting drift. The tradeoff is that
/// a slow-moving subject dominating the frame is gradually absorbed into the
/// baseline and stops registering.
///
/// Motion is judged per blob: a frame is motion-positive iff any single
/// connected region of changed pixels exceeds `motion_threshold`. One small
/// fast object therefore triggers even when accumulated noise stays spread
/// out across many tiny regions.
pub struct MotionClassifier {
    motion_threshold: u32,
    baseline: Option<GrayImage>,
    frames_seen: u64,
}

impl MotionClassifier {
    pub fn new(motion_threshold: u32) -> Self {
        Self {
            motion_threshold,
            baseline: None,
            frames_seen: 0,
        }
    }

    /// Classify one frame against the evolving baseline.
    ///
    /// Returns `Some(area)` with the largest changed-blob area when that
    /// area exceeds the threshold, `None` otherwise. The first frame always
    /// returns `None` (baseline bootstrap).
    pub fn classify(&mut self, frame: &Frame) -> Result<Option<u32>> {
        let gray = frame.to_gray()?;
        let blurred = gaussian_blur_f32(&gray, BLUR_SIGMA);
        self.frames_seen += 1;

        let baseline = match self.baseline.take() {
            Some(baseline) if baseline.dimensions() == blurred.dimensions() => baseline,
            Some(_) => {
                // Resolution changed mid-run, re-bootstrap
                debug!("Frame dimensions changed, resetting baseline");
                self.baseline = Some(blurred);
                return Ok(None);
            }
            None => {
                debug!("Initializing baseline with first frame");
                self.baseline = Some(blurred);
                return Ok(None);
            }
        };

        let diff = frame_difference(&baseline, &blurred);
        let mask = threshold(&diff, DIFF_THRESHOLD);
        let merged = dilate(
            &dilate(&mask, Norm::LInf, DILATE_RADIUS),
            Norm::LInf,
            DILATE_RADIUS,
        );
        let components = connected_components(&merged, Connectivity::Eight, Luma([0u8]));
        let largest = largest_component_area(&components);

        self.baseline = Some(blurred);

        if largest > self.motion_threshold {
            debug!(
                "Motion in frame {}: largest blob {} px (threshold {})",
                frame.id, largest, self.motion_threshold
            );
            Ok(Some(largest))
        } else {
            Ok(None)
        }
    }

    pub fn baseline_ready(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

/// Absolute per-pixel difference between two equally sized grayscale images
fn frame_difference(baseline: &GrayImage, current: &GrayImage) -> GrayImage {
    let (width, height) = baseline.dimensions();
    let mut diff = GrayImage::new(width, height);
    for (x, y, base_pixel) in baseline.enumerate_pixels() {
        let curr_pixel = current.get_pixel(x, y);
        let delta = (base_pixel[0] as i16 - curr_pixel[0] as i16).unsigned_abs() as u8;
        diff.put_pixel(x, y, Luma([delta]));
    }
    diff
}

/// Area in pixels of the largest labelled component, 0 for an empty mask
fn largest_component_area(components: &ImageBuffer<Luma<u32>, Vec<u32>>) -> u32 {
    let mut component_counts = std::collections::HashMap::new();
    for pixel in components.pixels() {
        let component_id = pixel[0];
        if component_id > 0 {
            *component_counts.entry(component_id).or_insert(0u32) += 1;
        }
    }
    component_counts.values().max().copied().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameFormat;
    use std::time::SystemTime;

    fn flat_frame(id: u64, width: u32, height: u32, level: u8) -> Frame {
        Frame::new(
            id,
            SystemTime::now(),
            vec![level; (width * height * 3) as usize],
            width,
            height,
            FrameFormat::Rgb24,
        )
    }

    fn blob_frame(id: u64, width: u32, height: u32, blobs: &[(u32, u32, u32)]) -> Frame {
        let mut data = vec![32u8; (width * height * 3) as usize];
        for &(bx, by, side) in blobs {
            for y in by..(by + side).min(height) {
                for x in bx..(bx + side).min(width) {
                    let idx = ((y * width + x) * 3) as usize;
                    data[idx] = 224;
                    data[idx + 1] = 224;
                    data[idx + 2] = 224;
                }
            }
        }
        Frame::new(id, SystemTime::now(), data, width, height, FrameFormat::Rgb24)
    }

    #[test]
    fn test_first_frame_bootstraps_baseline() {
        let mut classifier = MotionClassifier::new(100);
        assert!(!classifier.baseline_ready());

        let verdict = classifier.classify(&flat_frame(0, 64, 64, 32)).unwrap();
        assert!(verdict.is_none());
        assert!(classifier.baseline_ready());
    }

    #[test]
    fn test_identical_frames_report_no_motion() {
        let mut classifier = MotionClassifier::new(100);
        for id in 0..5 {
            let verdict = classifier.classify(&flat_frame(id, 64, 64, 32)).unwrap();
            assert!(verdict.is_none(), "frame {} reported motion", id);
        }
    }

    #[test]
    fn test_appearing_blob_reports_motion() {
        let mut classifier = MotionClassifier::new(100);
        classifier.classify(&flat_frame(0, 96, 96, 32)).unwrap();

        let verdict = classifier
            .classify(&blob_frame(1, 96, 96, &[(20, 20, 24)]))
            .unwrap();
        let area = verdict.expect("blob should register as motion");
        // 24x24 blob, grown a little by blur and dilation
        assert!(area >= 24 * 24, "area {} too small", area);
    }

    #[test]
    fn test_static_blob_absorbed_into_baseline() {
        let mut classifier = MotionClassifier::new(100);
        classifier.classify(&flat_frame(0, 96, 96, 32)).unwrap();

        let appeared = classifier
            .classify(&blob_frame(1, 96, 96, &[(20, 20, 24)]))
            .unwrap();
        assert!(appeared.is_some());

        // Same blob again: baseline now contains it, no further motion
        let held = classifier
            .classify(&blob_frame(2, 96, 96, &[(20, 20, 24)]))
            .unwrap();
        assert!(held.is_none());
    }

    #[test]
    fn test_blob_below_threshold_ignored() {
        let mut classifier = MotionClassifier::new(10_000);
        classifier.classify(&flat_frame(0, 96, 96, 32)).unwrap();

        let verdict = classifier
            .classify(&blob_frame(1, 96, 96, &[(20, 20, 12)]))
            .unwrap();
        assert!(verdict.is_none());
    }

    #[test]
    fn test_per_blob_threshold_not_aggregate() {
        // Two well separated equal blobs. Measure the largest single blob
        // first, then verify a threshold between one blob and their sum
        // reports no motion: areas are judged per blob, never summed.
        let baseline = flat_frame(0, 160, 96, 32);
        let two_blobs = blob_frame(1, 160, 96, &[(16, 30, 20), (110, 30, 20)]);

        let mut probe = MotionClassifier::new(1);
        probe.classify(&baseline).unwrap();
        let single = probe
            .classify(&two_blobs)
            .unwrap()
            .expect("blobs should register against a tiny threshold");

        let mut strict = MotionClassifier::new(single + single / 2);
        strict.classify(&baseline).unwrap();
        let verdict = strict.classify(&two_blobs).unwrap();
        assert!(
            verdict.is_none(),
            "aggregate area must not satisfy a per-blob threshold"
        );
    }

    #[test]
    fn test_moving_blob_triggers_every_frame() {
        let mut classifier = MotionClassifier::new(300);
        classifier.classify(&flat_frame(0, 256, 64, 32)).unwrap();

        for step in 0..4u32 {
            let x = 8 + step * 56;
            let verdict = classifier
                .classify(&blob_frame(step as u64 + 1, 256, 64, &[(x, 20, 20)]))
                .unwrap();
            assert!(verdict.is_some(), "moving blob missed at step {}", step);
        }
    }

    #[test]
    fn test_resolution_change_rebootstraps() {
        let mut classifier = MotionClassifier::new(100);
        classifier.classify(&flat_frame(0, 64, 64, 32)).unwrap();

        // Different dimensions: must not report motion, must not panic
        let verdict = classifier.classify(&flat_frame(1, 96, 96, 224)).unwrap();
        assert!(verdict.is_none());

        // Back to normal operation at the new size
        let verdict = classifier
            .classify(&blob_frame(2, 96, 96, &[(20, 20, 24)]))
            .unwrap();
        assert!(verdict.is_some());
    }
}
