//! Blocking HTTP implementation of [`FaceService`].
//!
//! Must be constructed and used off the async runtime; the daemon builds it
//! inside its engine thread.

use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use rollcall_core::{FaceMatch, FaceQuality, FaceService, ServiceError};

use crate::wire::{
    encode_image, DetectRequest, DetectResponse, IndexRequest, IndexResponse, SearchRequest,
    SearchResponse,
};

const USER_AGENT: &str = concat!("rollcall/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid face service URL {0:?}")]
    InvalidUrl(String),
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct FaceClientConfig {
    /// Base URL, e.g. `http://127.0.0.1:8700`.
    pub base_url: String,
    /// Optional bearer token.
    pub token: Option<String>,
    pub timeout: Duration,
}

pub struct HttpFaceService {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpFaceService {
    pub fn new(config: &FaceClientConfig) -> Result<Self, ClientError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| ClientError::InvalidUrl(config.base_url.clone()))?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        tracing::info!(url = %base_url, timeout_secs = config.timeout.as_secs(), "face service client ready");

        Ok(Self {
            http,
            base_url,
            token: config.token.clone(),
        })
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ServiceError::Rejected(format!("{} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn post<B: Serialize, R: DeserializeOwned>(&self, url: Url, body: &B) -> Result<R, ServiceError> {
        tracing::debug!(url = %url, "face service request");
        let path = url.path().to_string();

        let mut request = self.http.post(url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(map_transport)?;
        let response = check_status(response)?;
        response.json::<R>().map_err(|e| match map_transport(e) {
            ServiceError::Rejected(detail) => {
                ServiceError::Rejected(format!("undecodable response from {path}: {detail}"))
            }
            transient => transient,
        })
    }
}

fn map_transport(err: reqwest::Error) -> ServiceError {
    // A body read that hits the deadline surfaces as a decode error.
    if err.is_timeout() {
        ServiceError::Transient(err.to_string())
    } else if err.is_decode() || err.is_builder() {
        ServiceError::Rejected(err.to_string())
    } else {
        // Connect failures, resets, truncated bodies.
        ServiceError::Transient(err.to_string())
    }
}

/// Map a non-success status to the matching error kind, `None` on success.
pub fn classify_status(status: StatusCode, body: &str) -> Option<ServiceError> {
    if status.is_success() {
        return None;
    }
    let detail = if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("HTTP {}: {}", status.as_u16(), body.trim())
    };
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Some(ServiceError::Transient(detail))
    } else {
        Some(ServiceError::Rejected(detail))
    }
}

fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    match classify_status(status, &body) {
        Some(err) => Err(err),
        None => Err(ServiceError::Rejected(format!("HTTP {}", status.as_u16()))),
    }
}

impl FaceService for HttpFaceService {
    fn detect_faces(&self, image: &[u8]) -> Result<Vec<FaceQuality>, ServiceError> {
        let resp: DetectResponse = self.post(
            self.endpoint(&["v1", "faces", "detect"])?,
            &DetectRequest {
                image: encode_image(image),
            },
        )?;
        Ok(resp.faces.into_iter().map(Into::into).collect())
    }

    fn search_faces(
        &self,
        image: &[u8],
        collection: &str,
        max_results: usize,
        threshold: f32,
    ) -> Result<Vec<FaceMatch>, ServiceError> {
        let resp: SearchResponse = self.post(
            self.endpoint(&["v1", "collections", collection, "search"])?,
            &SearchRequest {
                image: encode_image(image),
                max_faces: max_results,
                threshold,
            },
        )?;
        Ok(resp
            .matches
            .into_iter()
            .take(max_results)
            .map(Into::into)
            .collect())
    }

    fn index_face(
        &self,
        image: &[u8],
        collection: &str,
        external_id: &str,
    ) -> Result<String, ServiceError> {
        let resp: IndexResponse = self.post(
            self.endpoint(&["v1", "collections", collection, "faces"])?,
            &IndexRequest {
                image: encode_image(image),
                external_id: external_id.to_string(),
            },
        )?;
        Ok(resp.face_id)
    }
}
