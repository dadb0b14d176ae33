//! Biometric linkage for registered identities.
//!
//! Only identities already present in the profile directory may link a
//! face; the face is indexed into the collection under the identity label
//! so later matches resolve straight to ledger entries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matcher::{FaceService, ServiceError};
use crate::outcome::RejectReason;
use crate::profile::{ProfileDirectory, ProfileError};
use crate::quality::{QualityGate, QualityVerdict};
use crate::types::Capture;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("{0} is not in the registry; contact HR for onboarding")]
    NotRegistered(String),
    #[error("capture rejected: {0}")]
    Rejected(RejectReason),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Directory(#[from] ProfileError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub identity_id: String,
    pub name: String,
    pub face_id: String,
}

pub fn enroll(
    faces: &dyn FaceService,
    profiles: &dyn ProfileDirectory,
    gate: &QualityGate,
    collection: &str,
    identity_id: &str,
    capture: &Capture,
) -> Result<Enrollment, EnrollError> {
    let profile = profiles
        .lookup(identity_id)?
        .ok_or_else(|| EnrollError::NotRegistered(identity_id.to_string()))?;

    match gate.check(faces, capture)? {
        QualityVerdict::Pass(_) => {}
        QualityVerdict::RejectNoFace => return Err(EnrollError::Rejected(RejectReason::NoFace)),
        QualityVerdict::RejectOccluded => return Err(EnrollError::Rejected(RejectReason::Occluded)),
        QualityVerdict::RejectBlurry {
            sharpness,
            threshold,
        } => {
            return Err(EnrollError::Rejected(RejectReason::Blurry {
                sharpness,
                threshold,
            }))
        }
    }

    let face_id = faces.index_face(capture.bytes(), collection, identity_id)?;
    tracing::info!(identity = identity_id, face_id = %face_id, collection, "face linked");

    Ok(Enrollment {
        identity_id: profile.identity_id,
        name: profile.name,
        face_id,
    })
}
