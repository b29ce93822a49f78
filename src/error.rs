use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Frame source error: {message}")]
    Source { message: String },

    #[error("Settings are locked while the detector is {state}")]
    SettingsLocked { state: String },

    #[error("Engine error: {message}")]
    Engine { message: String },

    #[error("Plate error: {message}")]
    Plate { message: String },
}

impl VigilError {
    pub fn source<S: Into<String>>(message: S) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    pub fn settings_locked<S: Into<String>>(state: S) -> Self {
        Self::SettingsLocked {
            state: state.into(),
        }
    }

    pub fn engine<S: Into<String>>(message: S) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    pub fn plate<S: Into<String>>(message: S) -> Self {
        Self::Plate {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VigilError>;
