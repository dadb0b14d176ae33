//! rollcall-face: Client for the remote face detection / match service.
//!
//! The service owns every biometric model; this crate only moves image
//! bytes over HTTP and maps failures onto transient vs. rejected.

pub mod client;
pub mod wire;

pub use client::{ClientError, FaceClientConfig, HttpFaceService};
