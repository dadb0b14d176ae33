//! JSON request/response bodies. Images travel base64-encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use rollcall_core::{FaceMatch, FaceQuality};

pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[derive(Debug, Serialize)]
pub struct DetectRequest {
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
}

#[derive(Debug, Deserialize)]
pub struct DetectedFace {
    #[serde(default)]
    pub occluded: bool,
    pub sharpness: f32,
}

impl From<DetectedFace> for FaceQuality {
    fn from(face: DetectedFace) -> Self {
        FaceQuality {
            occluded: face.occluded,
            sharpness: face.sharpness,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchRequest {
    pub image: String,
    pub max_faces: usize,
    pub threshold: f32,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub matches: Vec<SearchMatch>,
}

#[derive(Debug, Deserialize)]
pub struct SearchMatch {
    pub external_id: String,
    pub similarity: f32,
}

impl From<SearchMatch> for FaceMatch {
    fn from(m: SearchMatch) -> Self {
        FaceMatch {
            external_id: m.external_id,
            similarity: m.similarity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IndexRequest {
    pub image: String,
    pub external_id: String,
}

#[derive(Debug, Deserialize)]
pub struct IndexResponse {
    pub face_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_response_defaults() {
        let resp: DetectResponse =
            serde_json::from_str(r#"{"faces":[{"sharpness":42.5},{"occluded":true,"sharpness":90}]}"#).unwrap();
        let faces: Vec<FaceQuality> = resp.faces.into_iter().map(Into::into).collect();
        assert!(!faces[0].occluded);
        assert!(faces[1].occluded);
        assert!((faces[0].sharpness - 42.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_search_response() {
        let resp: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.matches.is_empty());
    }

    #[test]
    fn test_request_encodes_image() {
        let body = serde_json::to_value(SearchRequest {
            image: encode_image(b"jpeg"),
            max_faces: 1,
            threshold: 90.0,
        })
        .unwrap();
        assert_eq!(body["image"], "anBlZw==");
        assert_eq!(body["max_faces"], 1);
    }
}
