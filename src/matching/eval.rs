use crate::frame::Frame;
use crate::provider::FaceProvider;

/// A known identity paired with its reference image, as loaded for offline
/// evaluation runs.
#[derive(Debug, Clone)]
pub struct KnownFace {
    pub identity: String,
    pub reference: Frame,
}

/// Result of a cross-model evaluation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalMatch {
    pub identity: Option<String>,
    pub confidence: f32,
    pub model_id: Option<String>,
}

/// Best-match search across a set of candidate embedding models.
///
/// For every known identity and every candidate provider, runs an image-pair
/// verification and tracks the maximum confidence (`1 - distance`) among
/// positive verifications. The whole search short-circuits once the running
/// best exceeds `high_confidence_cutoff`, trading completeness for latency
/// when an obviously strong match is found.
///
/// This is deliberately a different policy from
/// [`IdentityMatchingEngine::authenticate`]'s first-match rule; the two are
/// kept as distinct behaviors.
///
/// [`IdentityMatchingEngine::authenticate`]: crate::matching::IdentityMatchingEngine::authenticate
pub fn best_match_across_models(
    frame: &Frame,
    providers: &[&dyn FaceProvider],
    known: &[KnownFace],
    high_confidence_cutoff: f32,
) -> EvalMatch {
    let mut best = EvalMatch {
        identity: None,
        confidence: -1.0,
        model_id: None,
    };

    'search: for face in known {
        for provider in providers {
            let verification = match provider.verify(frame, &face.reference) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        "Verification of {:?} with model {:?} failed: {}",
                        face.identity,
                        provider.model_id(),
                        e
                    );
                    continue;
                }
            };
            if !verification.matched {
                continue;
            }

            let confidence = 1.0 - verification.distance;
            if confidence > best.confidence {
                best = EvalMatch {
                    identity: Some(face.identity.clone()),
                    confidence,
                    model_id: Some(provider.model_id().to_string()),
                };
                if confidence > high_confidence_cutoff {
                    tracing::debug!(
                        "High-confidence match {:?} ({:.2}); stopping search",
                        face.identity,
                        confidence
                    );
                    break 'search;
                }
            }
        }
    }

    if best.identity.is_none() {
        best.confidence = 0.0;
    }
    best
}
