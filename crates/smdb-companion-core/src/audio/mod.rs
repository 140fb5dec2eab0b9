pub mod decode;
pub mod fingerprint;
pub mod mono;

use thiserror::Error;

pub use decode::{channels_identical, decode_mono, probe, AudioInfo};
pub use fingerprint::Fingerprint;
pub use mono::strip_to_mono;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported audio format: {0}")]
    Unsupported(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("No audio track found")]
    NoTrack,

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Decoding cancelled")]
    Cancelled,
}

impl From<symphonia::core::errors::Error> for AudioError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error as SymError;
        match err {
            SymError::IoError(e) => AudioError::Io(e),
            SymError::Unsupported(what) => AudioError::Unsupported(what.to_string()),
            other => AudioError::Decode(other.to_string()),
        }
    }
}
