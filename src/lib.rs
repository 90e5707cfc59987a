// Core modules
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod matching;
pub mod provider;
pub mod storage;

// Re-export commonly used types
pub use camera::{CameraSessionManager, CaptureState, FrameSource, FrameStream, V4l2Source};
pub use config::Config;
pub use error::{FaceGateError, Result};
pub use frame::{ColorSpace, Frame};
pub use matching::{best_match_across_models, IdentityMatchingEngine, MatchResult};
pub use provider::{euclidean_distance, Embedding, FaceProvider, ServiceProvider, Verification};
pub use storage::{BincodeStore, EnrollmentRecord, EnrollmentStore};
