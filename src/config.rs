use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VigilConfig {
    pub detector: DetectorConfig,
    pub source: SourceConfig,
    pub storage: StorageConfig,
}

/// Tuning knobs for the capture pipeline.
///
/// The engine treats this as an immutable snapshot: it can only be replaced
/// while the detector is stopped. A manual capture never advances the
/// automatic-capture cooldown clock; `cooldown_seconds` spaces automatic
/// captures only.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// Minimum single-blob area (pixels) that counts as motion
    #[serde(default = "default_motion_threshold")]
    pub motion_threshold: u32,

    /// JPEG quality for saved captures (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Saved captures are resized to this (width, height)
    #[serde(default = "default_target_resolution")]
    pub target_resolution: (u32, u32),

    /// Minimum seconds between consecutive automatic captures
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Consecutive motion-positive frames required before an automatic capture
    #[serde(default = "default_debounce_frame_count")]
    pub debounce_frame_count: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_source_index")]
    pub index: u32,

    /// Capture loop cadence in frames per second
    #[serde(default = "default_source_fps")]
    pub fps: u32,

    /// Source resolution (width, height)
    #[serde(default = "default_source_resolution")]
    pub resolution: (u32, u32),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Directory where captures are written
    #[serde(default = "default_capture_dir")]
    pub capture_dir: String,

    /// Append-only capture log filename, created inside capture_dir
    #[serde(default = "default_historial_file")]
    pub historial_file: String,

    /// Authorized plate registry filename, created inside capture_dir
    #[serde(default = "default_plate_registry_file")]
    pub plate_registry_file: String,

    /// IANA timezone for filenames and log lines (falls back to UTC)
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl VigilConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("vigil.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("detector.motion_threshold", default_motion_threshold())?
            .set_default("detector.jpeg_quality", default_jpeg_quality())?
            .set_default(
                "detector.target_resolution",
                vec![
                    default_target_resolution().0,
                    default_target_resolution().1,
                ],
            )?
            .set_default("detector.cooldown_seconds", default_cooldown_seconds())?
            .set_default(
                "detector.debounce_frame_count",
                default_debounce_frame_count(),
            )?
            .set_default("source.index", default_source_index())?
            .set_default("source.fps", default_source_fps())?
            .set_default(
                "source.resolution",
                vec![default_source_resolution().0, default_source_resolution().1],
            )?
            .set_default("storage.capture_dir", default_capture_dir())?
            .set_default("storage.historial_file", default_historial_file())?
            .set_default(
                "storage.plate_registry_file",
                default_plate_registry_file(),
            )?
            .set_default("storage.timezone", default_timezone())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with VIGIL_ prefix
            .add_source(Environment::with_prefix("VIGIL").separator("_"))
            .build()?;

        let config: VigilConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detector.motion_threshold == 0 {
            return Err(ConfigError::Message(
                "Motion threshold must be greater than 0".to_string(),
            ));
        }

        if self.detector.jpeg_quality == 0 || self.detector.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        if self.detector.target_resolution.0 == 0 || self.detector.target_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Target resolution must be greater than 0".to_string(),
            ));
        }

        if self.detector.debounce_frame_count == 0 {
            return Err(ConfigError::Message(
                "Debounce frame count must be greater than 0".to_string(),
            ));
        }

        if self.source.fps == 0 {
            return Err(ConfigError::Message(
                "Source fps must be greater than 0".to_string(),
            ));
        }

        if self.source.resolution.0 == 0 || self.source.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Source resolution must be greater than 0".to_string(),
            ));
        }

        if self.storage.capture_dir.is_empty() {
            return Err(ConfigError::Message(
                "Capture directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            source: SourceConfig {
                index: default_source_index(),
                fps: default_source_fps(),
                resolution: default_source_resolution(),
            },
            storage: StorageConfig {
                capture_dir: default_capture_dir(),
                historial_file: default_historial_file(),
                plate_registry_file: default_plate_registry_file(),
                timezone: default_timezone(),
            },
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            motion_threshold: default_motion_threshold(),
            jpeg_quality: default_jpeg_quality(),
            target_resolution: default_target_resolution(),
            cooldown_seconds: default_cooldown_seconds(),
            debounce_frame_count: default_debounce_frame_count(),
        }
    }
}

// Default value functions
fn default_motion_threshold() -> u32 {
    2500
}
fn default_jpeg_quality() -> u8 {
    75
}
fn default_target_resolution() -> (u32, u32) {
    (1280, 720)
}
fn default_cooldown_seconds() -> u64 {
    5
}
fn default_debounce_frame_count() -> u32 {
    5
}

fn default_source_index() -> u32 {
    0
}
fn default_source_fps() -> u32 {
    30
}
fn default_source_resolution() -> (u32, u32) {
    (640, 480)
}

fn default_capture_dir() -> String {
    "./captures".to_string()
}
fn default_historial_file() -> String {
    "historial.txt".to_string()
}
fn default_plate_registry_file() -> String {
    "authorized_plates.json".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}
