pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod source;
pub mod classifier;
pub mod stabilizer;
pub mod gate;
pub mod writer;
pub mod plates;
pub mod engine;

pub use config::{DetectorConfig, SourceConfig, StorageConfig, VigilConfig};
pub use error::{Result, VigilError};
pub use events::{Event, EventChannel, EventSender};
pub use frame::{Frame, FrameFormat};
pub use source::{FrameSource, FrameSourceHandle, SyntheticScene, SyntheticSource};
pub use classifier::MotionClassifier;
pub use stabilizer::{sharpness_score, StabilizationBuffer};
pub use gate::CooldownGate;
pub use writer::{Capture, CaptureKind, CaptureWriter};
pub use plates::{
    PlateRecognizer, PlateRegistry, PlateReview, PlateWatcher, StaticRecognizer,
};
pub use engine::{DetectorEngine, EngineState, Statistics};
