//! Identity matching against the remote face collection.

use thiserror::Error;

use crate::types::{Capture, FaceMatch, FaceQuality, MatchResult};

/// Default similarity threshold (0–100) for a positive identification.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 90.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Unreachable, timed out or throttled. Safe to retry from scratch.
    #[error("face service unavailable: {0}")]
    Transient(String),
    /// The service refused the request (bad image, unknown collection, …).
    #[error("face service rejected request: {0}")]
    Rejected(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

/// Remote face detection / search / index capability.
///
/// Implementations are blocking; the daemon calls them from its engine
/// thread.
pub trait FaceService: Send {
    /// Quality attributes of every detected face, primary face first.
    fn detect_faces(&self, image: &[u8]) -> Result<Vec<FaceQuality>, ServiceError>;

    /// Search `collection` for faces similar to the primary face in `image`.
    fn search_faces(
        &self,
        image: &[u8],
        collection: &str,
        max_results: usize,
        threshold: f32,
    ) -> Result<Vec<FaceMatch>, ServiceError>;

    /// Index the primary face of `image` into `collection` under
    /// `external_id`. Returns the service's face id.
    fn index_face(
        &self,
        image: &[u8],
        collection: &str,
        external_id: &str,
    ) -> Result<String, ServiceError>;
}

/// Best-single-candidate matcher with a hard threshold.
#[derive(Debug, Clone)]
pub struct IdentityMatcher {
    collection: String,
    threshold: f32,
}

impl IdentityMatcher {
    pub fn new(collection: impl Into<String>, threshold: f32) -> Self {
        Self {
            collection: collection.into(),
            threshold,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Match the capture against the collection.
    ///
    /// The threshold is re-applied locally: a candidate the service returns
    /// below it is reported as no match, never as a weak one.
    pub fn identify(
        &self,
        service: &dyn FaceService,
        capture: &Capture,
    ) -> Result<MatchResult, ServiceError> {
        let candidates =
            service.search_faces(capture.bytes(), &self.collection, 1, self.threshold)?;
        Ok(self.interpret(&candidates))
    }

    fn interpret(&self, candidates: &[FaceMatch]) -> MatchResult {
        let best = candidates.iter().max_by(|a, b| {
            a.similarity
                .partial_cmp(&b.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        match best {
            Some(m) if m.similarity >= self.threshold && !m.external_id.is_empty() => MatchResult {
                identity_id: Some(m.external_id.clone()),
                confidence: m.similarity,
            },
            Some(m) => {
                tracing::debug!(
                    similarity = m.similarity,
                    threshold = self.threshold,
                    "best candidate below threshold"
                );
                MatchResult {
                    identity_id: None,
                    confidence: if m.similarity.is_nan() { 0.0 } else { m.similarity },
                }
            }
            None => MatchResult::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(Result<Vec<FaceMatch>, ServiceError>);

    impl FaceService for Canned {
        fn detect_faces(&self, _: &[u8]) -> Result<Vec<FaceQuality>, ServiceError> {
            Ok(vec![])
        }

        fn search_faces(
            &self,
            _: &[u8],
            _: &str,
            max_results: usize,
            _: f32,
        ) -> Result<Vec<FaceMatch>, ServiceError> {
            assert_eq!(max_results, 1);
            self.0.clone()
        }

        fn index_face(&self, _: &[u8], _: &str, _: &str) -> Result<String, ServiceError> {
            Ok("face-1".into())
        }
    }

    fn candidate(id: &str, similarity: f32) -> FaceMatch {
        FaceMatch {
            external_id: id.into(),
            similarity,
        }
    }

    fn capture() -> Capture {
        Capture::new(vec![1, 2, 3])
    }

    #[test]
    fn test_match_above_threshold() {
        let service = Canned(Ok(vec![candidate("EMP2025", 95.0)]));
        let result = IdentityMatcher::new("faces", 90.0).identify(&service, &capture()).unwrap();
        assert_eq!(result.identity_id.as_deref(), Some("EMP2025"));
        assert!((result.confidence - 95.0).abs() < 1e-6);
    }

    #[test]
    fn test_match_at_threshold_counts() {
        let service = Canned(Ok(vec![candidate("EMP2025", 90.0)]));
        let result = IdentityMatcher::new("faces", 90.0).identify(&service, &capture()).unwrap();
        assert!(result.identity_id.is_some());
    }

    #[test]
    fn test_below_threshold_is_no_match() {
        let service = Canned(Ok(vec![candidate("EMP2025", 85.0)]));
        let result = IdentityMatcher::new("faces", 90.0).identify(&service, &capture()).unwrap();
        assert_eq!(result.identity_id, None);
        assert!((result.confidence - 85.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_candidates_is_no_match() {
        let service = Canned(Ok(vec![]));
        let result = IdentityMatcher::new("faces", 90.0).identify(&service, &capture()).unwrap();
        assert_eq!(result, MatchResult::none());
    }

    #[test]
    fn test_best_of_several_candidates() {
        let service = Canned(Ok(vec![candidate("a", 91.0), candidate("b", 99.0)]));
        let result = IdentityMatcher::new("faces", 90.0).identify(&service, &capture()).unwrap();
        assert_eq!(result.identity_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_transient_error_is_not_no_match() {
        let service = Canned(Err(ServiceError::Transient("throttled".into())));
        let err = IdentityMatcher::new("faces", 90.0)
            .identify(&service, &capture())
            .unwrap_err();
        assert!(err.is_transient());
    }
}
