use crate::frame::Frame;
use serde::{Deserialize, Serialize};

// Request types
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Request {
    ModelInfo,
    HasFace { frame: Frame },
    Embed { frame: Frame },
    Verify { live: Frame, reference: Frame },
}

// Response types
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum Response {
    ModelInfo { model_id: String, dimensions: u32 },
    FacePresent { present: bool },
    Embedding { vector: Vec<f32> },
    Verified { matched: bool, distance: f32 },
    Error(String),
}

/// Upper bound on a single framed message. Large enough for an uncompressed
/// 4096x4096 RGB frame.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;
