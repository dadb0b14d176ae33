//! Capture quality gate.
//!
//! Runs before the (costlier) match call. Occluded faces are never
//! matched regardless of confidence; low sharpness catches both unusable
//! captures and printed-photo / screen spoofs.

use crate::matcher::{FaceService, ServiceError};
use crate::types::{Capture, FaceQuality};

/// Default sharpness floor on the face service's 0–100 scale.
pub const DEFAULT_SHARPNESS_THRESHOLD: f32 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityVerdict {
    Pass(FaceQuality),
    RejectNoFace,
    RejectOccluded,
    RejectBlurry { sharpness: f32, threshold: f32 },
}

impl QualityVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, QualityVerdict::Pass(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QualityGate {
    sharpness_threshold: f32,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(DEFAULT_SHARPNESS_THRESHOLD)
    }
}

impl QualityGate {
    pub fn new(sharpness_threshold: f32) -> Self {
        Self {
            sharpness_threshold,
        }
    }

    pub fn sharpness_threshold(&self) -> f32 {
        self.sharpness_threshold
    }

    /// Detect faces in the capture and judge the primary one.
    pub fn check(
        &self,
        service: &dyn FaceService,
        capture: &Capture,
    ) -> Result<QualityVerdict, ServiceError> {
        let faces = service.detect_faces(capture.bytes())?;
        Ok(self.judge(&faces))
    }

    /// Judge the primary (first) face. Occlusion wins over blur.
    pub fn judge(&self, faces: &[FaceQuality]) -> QualityVerdict {
        let Some(primary) = faces.first() else {
            return QualityVerdict::RejectNoFace;
        };
        if primary.occluded {
            return QualityVerdict::RejectOccluded;
        }
        // NaN sharpness fails the comparison and is treated as blurry.
        if !(primary.sharpness >= self.sharpness_threshold) {
            return QualityVerdict::RejectBlurry {
                sharpness: primary.sharpness,
                threshold: self.sharpness_threshold,
            };
        }
        QualityVerdict::Pass(*primary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(occluded: bool, sharpness: f32) -> FaceQuality {
        FaceQuality {
            occluded,
            sharpness,
        }
    }

    #[test]
    fn test_no_face_rejected() {
        assert_eq!(QualityGate::default().judge(&[]), QualityVerdict::RejectNoFace);
    }

    #[test]
    fn test_occluded_rejected_even_when_sharp() {
        let verdict = QualityGate::default().judge(&[face(true, 99.0)]);
        assert_eq!(verdict, QualityVerdict::RejectOccluded);
    }

    #[test]
    fn test_blurry_rejected() {
        let verdict = QualityGate::default().judge(&[face(false, 20.0)]);
        assert_eq!(
            verdict,
            QualityVerdict::RejectBlurry {
                sharpness: 20.0,
                threshold: 30.0
            }
        );
    }

    #[test]
    fn test_threshold_boundary_passes() {
        assert!(QualityGate::default().judge(&[face(false, 30.0)]).passed());
    }

    #[test]
    fn test_nan_sharpness_rejected() {
        let verdict = QualityGate::default().judge(&[face(false, f32::NAN)]);
        assert!(matches!(verdict, QualityVerdict::RejectBlurry { .. }));
    }

    #[test]
    fn test_only_primary_face_inspected() {
        // A sharp second face cannot rescue an occluded primary face.
        let verdict = QualityGate::default().judge(&[face(true, 80.0), face(false, 80.0)]);
        assert_eq!(verdict, QualityVerdict::RejectOccluded);
    }

    #[test]
    fn test_custom_threshold() {
        assert!(!QualityGate::new(50.0).judge(&[face(false, 45.0)]).passed());
        assert!(QualityGate::new(10.0).judge(&[face(false, 15.0)]).passed());
    }
}
