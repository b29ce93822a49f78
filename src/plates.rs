use crate::error::{Result, VigilError};
use crate::events::EventSender;
use crate::frame::Frame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// Costa Rican plates are six digits, zero-padded
pub const PLATE_LENGTH: usize = 6;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    authorized_plates: Vec<String>,
}

/// JSON-backed whitelist of authorized plate numbers.
///
/// Every lookup and mutation normalizes its input first, so callers can
/// pass raw recognizer output ("AB 12-34-56") and still match the stored
/// "123456". Mutations rewrite the whole file; the set is expected to
/// stay small.
#[derive(Debug)]
pub struct PlateRegistry {
    path: PathBuf,
    plates: BTreeSet<String>,
}

impl PlateRegistry {
    /// Load the registry, starting empty when the file is missing or
    /// unparseable. The file is only created once a plate is added.
    pub async fn load<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();

        let plates = if path.exists() {
            let contents = fs::read_to_string(&path).await?;
            match serde_json::from_str::<RegistryFile>(&contents) {
                Ok(file) => file.authorized_plates.into_iter().collect(),
                Err(e) => {
                    warn!(
                        "Unreadable plate registry {}: {}, starting empty",
                        path.display(),
                        e
                    );
                    BTreeSet::new()
                }
            }
        } else {
            debug!("No plate registry at {}, starting empty", path.display());
            BTreeSet::new()
        };

        Ok(Self { path, plates })
    }

    /// Reduce arbitrary input to a plate number: keep the digits, left-pad
    /// with zeros to six, drop anything past six. `None` when the input
    /// holds no digits at all.
    pub fn normalize(input: &str) -> Option<String> {
        let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return None;
        }
        let mut plate = format!("{:0>width$}", digits, width = PLATE_LENGTH);
        plate.truncate(PLATE_LENGTH);
        Some(plate)
    }

    pub fn is_valid_format(plate: &str) -> bool {
        plate.len() == PLATE_LENGTH && plate.chars().all(|c| c.is_ascii_digit())
    }

    /// Authorize a plate and persist the registry. `Ok(false)` when the
    /// input holds no digits; re-adding an existing plate is fine.
    pub async fn add(&mut self, plate: &str) -> Result<bool> {
        let normalized = match Self::normalize(plate) {
            Some(p) => p,
            None => return Ok(false),
        };

        if self.plates.insert(normalized.clone()) {
            info!("Plate {} authorized", normalized);
        }
        self.save().await?;
        Ok(true)
    }

    /// Revoke a plate. `Ok(false)` when it was not in the registry.
    pub async fn remove(&mut self, plate: &str) -> Result<bool> {
        let normalized = match Self::normalize(plate) {
            Some(p) => p,
            None => return Ok(false),
        };

        if self.plates.remove(&normalized) {
            self.save().await?;
            info!("Plate {} revoked", normalized);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn is_authorized(&self, plate: &str) -> bool {
        match Self::normalize(plate) {
            Some(normalized) => self.plates.contains(&normalized),
            None => false,
        }
    }

    /// Authorized plates in sorted order
    pub fn plates(&self) -> Vec<String> {
        self.plates.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self) -> Result<()> {
        let file = RegistryFile {
            authorized_plates: self.plates.iter().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| VigilError::plate(format!("Failed to serialize registry: {}", e)))?;
        fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// Extracts a plate number from a frame.
///
/// The OCR backend lives behind this trait so the review flow can be
/// exercised without one.
#[async_trait]
pub trait PlateRecognizer: Send + Sync {
    /// Raw plate text when one is legible in the frame
    async fn recognize(&self, frame: &Frame) -> Result<Option<String>>;
}

/// Outcome of reviewing one frame against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlateReview {
    Authorized { plate: String },
    Unauthorized { plate: String },
    Unreadable,
}

/// Runs frames through the recognizer and checks the result against the
/// authorized registry, reporting verdicts on the event channel.
pub struct PlateWatcher {
    registry: PlateRegistry,
    recognizer: Arc<dyn PlateRecognizer>,
    events: EventSender,
}

impl PlateWatcher {
    pub fn new(
        registry: PlateRegistry,
        recognizer: Arc<dyn PlateRecognizer>,
        events: EventSender,
    ) -> Self {
        Self {
            registry,
            recognizer,
            events,
        }
    }

    /// Review one frame. Recognizer failures surface as error events and
    /// count as unreadable; they never abort the caller's loop.
    pub async fn review(&self, frame: &Frame) -> PlateReview {
        let raw = match self.recognizer.recognize(frame).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("No plate legible in frame {}", frame.id);
                return PlateReview::Unreadable;
            }
            Err(e) => {
                self.events
                    .error(format!("Plate recognition failed: {}", e));
                return PlateReview::Unreadable;
            }
        };

        let plate = match PlateRegistry::normalize(&raw) {
            Some(plate) => plate,
            None => {
                debug!("Recognizer output '{}' holds no digits", raw);
                return PlateReview::Unreadable;
            }
        };

        if self.registry.is_authorized(&plate) {
            self.events.info(format!("Authorized plate {}", plate));
            PlateReview::Authorized { plate }
        } else {
            self.events.error(format!("Unauthorized plate {}", plate));
            PlateReview::Unauthorized { plate }
        }
    }

    pub fn registry(&self) -> &PlateRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PlateRegistry {
        &mut self.registry
    }
}

/// Canned recognizer for tests and the headless demo
pub struct StaticRecognizer {
    outcome: StaticOutcome,
}

enum StaticOutcome {
    Plate(String),
    Unreadable,
    Fail(String),
}

impl StaticRecognizer {
    pub fn plate<S: Into<String>>(text: S) -> Self {
        Self {
            outcome: StaticOutcome::Plate(text.into()),
        }
    }

    pub fn unreadable() -> Self {
        Self {
            outcome: StaticOutcome::Unreadable,
        }
    }

    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self {
            outcome: StaticOutcome::Fail(message.into()),
        }
    }
}

#[async_trait]
impl PlateRecognizer for StaticRecognizer {
    async fn recognize(&self, _frame: &Frame) -> Result<Option<String>> {
        match &self.outcome {
            StaticOutcome::Plate(text) => Ok(Some(text.clone())),
            StaticOutcome::Unreadable => Ok(None),
            StaticOutcome::Fail(message) => Err(VigilError::plate(message.clone())),
        }
    }
}
