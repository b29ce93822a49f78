use crate::config::{DetectorConfig, StorageConfig};
use crate::error::Result;
use crate::events::{Event, EventSender};
use crate::frame::Frame;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const HISTORIAL_HEADER: &str = "=== Capture history ===";

/// How a capture came to be persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureKind {
    /// Fired by the motion pipeline once debounce and cooldown cleared
    Automatic,
    /// Requested by the caller through the control surface
    Manual,
}

impl CaptureKind {
    pub fn label(&self) -> &'static str {
        match self {
            CaptureKind::Automatic => "automatic",
            CaptureKind::Manual => "manual",
        }
    }

    fn filename_prefix(&self) -> &'static str {
        match self {
            CaptureKind::Automatic => "",
            CaptureKind::Manual => "manual_",
        }
    }
}

/// Record of one persisted capture. Created once, never mutated; deleting
/// capture files is an external gallery concern, not handled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub kind: CaptureKind,
    pub size_bytes: u64,
}

/// Resolve configured timezone, falling back to UTC on parse errors
fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Invalid timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}

/// Persists frames as resized JPEGs plus one line in the append-only
/// historial log.
///
/// The capture directory is created once at construction. A failed encode
/// or write emits an error event and leaves the historial untouched; it
/// never aborts the capture loop.
pub struct CaptureWriter {
    capture_dir: PathBuf,
    historial_path: PathBuf,
    timezone: Tz,
    events: EventSender,
}

impl CaptureWriter {
    pub async fn new(storage: &StorageConfig, events: EventSender) -> Result<Self> {
        let capture_dir = PathBuf::from(&storage.capture_dir);
        if !capture_dir.exists() {
            fs::create_dir_all(&capture_dir).await?;
            info!("Created capture directory: {}", capture_dir.display());
        }

        let historial_path = capture_dir.join(&storage.historial_file);

        Ok(Self {
            capture_dir,
            historial_path,
            timezone: resolve_timezone(&storage.timezone),
            events,
        })
    }

    pub fn capture_dir(&self) -> &Path {
        &self.capture_dir
    }

    pub fn historial_path(&self) -> &Path {
        &self.historial_path
    }

    /// Persist one frame and report the outcome on the event channel.
    ///
    /// Returns the capture record on success so the caller can update its
    /// counters; returns `None` after emitting an error event on failure.
    pub async fn save(
        &self,
        frame: &Frame,
        kind: CaptureKind,
        config: &DetectorConfig,
    ) -> Option<Capture> {
        match self.persist(frame, kind, config).await {
            Ok(capture) => {
                self.events.send(Event::CaptureSaved(capture.clone()));
                Some(capture)
            }
            Err(e) => {
                self.events
                    .error(format!("Failed to save {} capture: {}", kind.label(), e));
                None
            }
        }
    }

    async fn persist(
        &self,
        frame: &Frame,
        kind: CaptureKind,
        config: &DetectorConfig,
    ) -> Result<Capture> {
        let rgb = frame.to_rgb()?;
        let (target_width, target_height) = config.target_resolution;

        let resized = if rgb.dimensions() == (target_width, target_height) {
            rgb
        } else {
            imageops::resize(&rgb, target_width, target_height, FilterType::Triangle)
        };

        let mut jpeg = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, config.jpeg_quality);
        encoder.encode_image(&resized)?;

        let now = Utc::now();
        let local = now.with_timezone(&self.timezone);
        let filename = format!(
            "{}{}.jpg",
            kind.filename_prefix(),
            local.format("%Y%m%d_%H%M%S_%3f")
        );
        let path = self.capture_dir.join(&filename);

        let size_bytes = jpeg.len() as u64;
        fs::write(&path, &jpeg).await?;
        self.append_historial(&local.format("%Y-%m-%d %H:%M:%S").to_string(), kind, &filename)
            .await?;

        debug!(
            "Persisted {} capture {} ({} bytes)",
            kind.label(),
            filename,
            size_bytes
        );

        Ok(Capture {
            filename,
            timestamp: now,
            kind,
            size_bytes,
        })
    }

    async fn append_historial(
        &self,
        stamp: &str,
        kind: CaptureKind,
        filename: &str,
    ) -> Result<()> {
        let needs_header = !self.historial_path.exists();

        let mut file = fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.historial_path)
            .await?;

        if needs_header {
            file.write_all(format!("{}\n", HISTORIAL_HEADER).as_bytes())
                .await?;
        }

        let line = format!("{} - {} - {}\n", stamp, kind.label(), filename);
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Last `count` historial entries in file order, header excluded
    pub async fn recent_history(&self, count: usize) -> Result<Vec<String>> {
        if !self.historial_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.historial_path).await?;
        let entries: Vec<String> = contents
            .lines()
            .filter(|line| !line.starts_with("===") && !line.trim().is_empty())
            .map(|line| line.to_string())
            .collect();

        let skip = entries.len().saturating_sub(count);
        Ok(entries.into_iter().skip(skip).collect())
    }

    /// Newest-first listing of up to `count` saved captures
    pub async fn recent_captures(&self, count: usize) -> Result<Vec<PathBuf>> {
        let mut jpegs = Vec::new();
        let mut entries = fs::read_dir(&self.capture_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jpg") {
                let modified = entry.metadata().await?.modified()?;
                jpegs.push((modified, path));
            }
        }

        // Kind prefixes break lexicographic recency, so order on save time
        jpegs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(jpegs.into_iter().take(count).map(|(_, path)| path).collect())
    }
}
