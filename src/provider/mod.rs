pub mod protocol;
pub mod service;

pub use service::ServiceProvider;

use crate::error::Result;
use crate::frame::Frame;

/// A fixed-length face feature vector. Dimensionality is provider-defined and
/// stable within a deployment; embeddings from different providers must never
/// be compared (see the model-id tag on stored records).
pub type Embedding = Vec<f32>;

/// Outcome of a direct image-pair verification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    pub matched: bool,
    pub distance: f32,
}

/// The external face model, consumed as an opaque capability set.
///
/// Calls may block for model-inference latency; callers treat them as
/// blocking operations, not fire-and-forget.
pub trait FaceProvider: Send + Sync {
    /// Stable identifier for the model/configuration producing embeddings.
    fn model_id(&self) -> &str;

    fn has_face(&self, frame: &Frame) -> Result<bool>;

    fn embed(&self, frame: &Frame) -> Result<Embedding>;

    fn verify(&self, live: &Frame, reference: &Frame) -> Result<Verification>;
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    // Both vectors come from the same model; the model-id tag on stored
    // records keeps mixed-dimensionality pairs out of this path.
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
