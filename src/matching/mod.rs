pub mod eval;

pub use eval::{best_match_across_models, EvalMatch, KnownFace};

use crate::error::{FaceGateError, Result};
use crate::frame::Frame;
use crate::provider::{euclidean_distance, FaceProvider};
use crate::storage::{EnrollmentRecord, EnrollmentStore};

/// Outcome of one authentication attempt. Transient, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: Option<String>,
    pub confidence: f32,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }

    fn unmatched() -> Self {
        Self {
            identity: None,
            confidence: 0.0,
        }
    }
}

/// Resolves a frame to an enrolled identity, or certifies a frame as safe to
/// enroll as a new one. Stateless between calls; all state lives in the store.
pub struct IdentityMatchingEngine<P: FaceProvider, S: EnrollmentStore> {
    provider: P,
    store: S,
    threshold: f32,
}

impl<P: FaceProvider, S: EnrollmentStore> IdentityMatchingEngine<P, S> {
    pub fn new(provider: P, store: S, threshold: f32) -> Self {
        Self {
            provider,
            store,
            threshold,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve the frame against all enrollments.
    ///
    /// Each record is accepted if the Euclidean distance between the probe
    /// and stored embedding is below the threshold, or if direct image-pair
    /// verification against the stored reference succeeds. The FIRST record
    /// in store iteration order that satisfies either signal wins; this is a
    /// first-match policy, not closest-match (the cross-model evaluation in
    /// [`best_match_across_models`] is the best-match variant).
    pub fn authenticate(&self, frame: &Frame) -> Result<MatchResult> {
        if !self.provider.has_face(frame)? {
            return Err(FaceGateError::NoFaceDetected);
        }

        let probe = self.provider.embed(frame)?;

        let records = self.store.list_all()?;
        if records.is_empty() {
            return Err(FaceGateError::NoEnrollments);
        }

        for record in &records {
            if record.model_id != self.provider.model_id() {
                tracing::warn!(
                    "Skipping {:?}: embedding from model {:?}, active model is {:?}",
                    record.identity,
                    record.model_id,
                    self.provider.model_id()
                );
                continue;
            }

            let distance = euclidean_distance(&probe, &record.embedding);
            let mut accepted = distance < self.threshold;

            // Second signal: image-level corroboration. Tolerates embedding
            // drift that pushes the distance past the threshold.
            if !accepted {
                if let Some(jpeg) = &record.reference_jpeg {
                    match Frame::from_jpeg(jpeg)
                        .and_then(|reference| self.provider.verify(frame, &reference))
                    {
                        Ok(verification) => accepted = verification.matched,
                        Err(e) => {
                            tracing::warn!(
                                "Verification against {:?} failed: {}",
                                record.identity,
                                e
                            );
                        }
                    }
                }
            }

            if accepted {
                let confidence = (1.0 - distance).clamp(0.0, 1.0);
                tracing::info!(
                    "Matched identity {:?} (distance {:.3}, confidence {:.3})",
                    record.identity,
                    distance,
                    confidence
                );
                return Ok(MatchResult {
                    identity: Some(record.identity.clone()),
                    confidence,
                });
            }
        }

        tracing::info!("No enrollment matched the probe");
        Ok(MatchResult::unmatched())
    }

    /// Enroll a new identity from the frame. The frame itself is kept as the
    /// JPEG reference image, and the embedding is tagged with the active
    /// provider's model id.
    pub fn enroll(&self, identity: &str, frame: &Frame) -> Result<EnrollmentRecord> {
        if self.store.get(identity)?.is_some() {
            return Err(FaceGateError::DuplicateIdentity(identity.to_string()));
        }

        if !self.provider.has_face(frame)? {
            return Err(FaceGateError::NoFaceDetected);
        }
        let embedding = self.provider.embed(frame)?;
        let reference = frame.to_jpeg()?;

        let record = EnrollmentRecord::new(
            identity.to_string(),
            self.provider.model_id().to_string(),
            embedding,
            Some(reference),
        );
        // The store re-checks uniqueness under its own lock; the check above
        // only gives the caller an early answer.
        self.store.insert(&record)?;
        Ok(record)
    }
}
