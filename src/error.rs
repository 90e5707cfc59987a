use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceGateError {
    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("No frame available")]
    NoFrameAvailable,

    #[error("No face detected")]
    NoFaceDetected,

    #[error("Embedding extraction failed: {0}")]
    EmbeddingExtractionFailed(String),

    #[error("No identities enrolled")]
    NoEnrollments,

    #[error("Identity already enrolled: {0}")]
    DuplicateIdentity(String),

    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FaceGateError>;
