use serde_json::json;
use zbus::{fdo, interface};

use rollcall_core::enroll::EnrollError;
use rollcall_core::{Action, Capture, Mode, Profile, ProfileError};

use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    engine: EngineHandle,
    terminal_id: String,
    collection_id: String,
    match_threshold: f32,
    sharpness_threshold: f32,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle, config: &Config) -> Self {
        Self {
            engine,
            terminal_id: config.terminal_id.clone(),
            collection_id: config.collection_id.clone(),
            match_threshold: config.match_threshold,
            sharpness_threshold: config.sharpness_threshold,
        }
    }
}

/// `auto` (or empty) infers the action; `login` / `logout` request one.
pub fn parse_mode(action: &str) -> Result<Mode, String> {
    match action.trim() {
        "" | "auto" => Ok(Mode::AutoInfer),
        other => other.parse::<Action>().map(Mode::Explicit),
    }
}

fn capture_from(image: Vec<u8>) -> fdo::Result<Capture> {
    if image.is_empty() {
        return Err(fdo::Error::InvalidArgs("image is empty".into()));
    }
    Ok(Capture::new(image))
}

fn to_fdo(err: EngineError) -> fdo::Error {
    match err {
        EngineError::Enroll(EnrollError::NotRegistered(id)) => {
            fdo::Error::AccessDenied(format!("{id} is not in the registry; contact HR for onboarding"))
        }
        EngineError::Enroll(EnrollError::Rejected(reason)) => {
            fdo::Error::InvalidArgs(format!("capture rejected: {reason}"))
        }
        EngineError::Profile(ProfileError::Invalid(msg)) => fdo::Error::InvalidArgs(msg),
        other => fdo::Error::Failed(other.to_string()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| fdo::Error::Failed(format!("serialize: {e}")))
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Submit a capture. `action` is `auto`, `login` or `logout`.
    /// Returns the outcome as JSON with its message and retry hint.
    async fn clock(&self, image: Vec<u8>, action: &str) -> fdo::Result<String> {
        let mode = parse_mode(action).map_err(fdo::Error::InvalidArgs)?;
        let capture = capture_from(image)?;
        tracing::info!(bytes = capture.len(), ?mode, "clock requested");

        let outcome = self.engine.process(capture, mode).await.map_err(to_fdo)?;
        to_json(&json!({
            "outcome": outcome,
            "message": outcome.message(),
            "retryable": outcome.retryable(),
        }))
    }

    /// Today's dashboard report as JSON.
    async fn today_log(&self) -> fdo::Result<String> {
        let report = self.engine.report().await.map_err(to_fdo)?;
        to_json(&report)
    }

    /// Full event history for one identity, newest first, as JSON.
    async fn history(&self, identity: &str) -> fdo::Result<String> {
        tracing::info!(identity, "history requested");
        let events = self.engine.history(identity.to_string()).await.map_err(to_fdo)?;
        to_json(&events)
    }

    /// Link a face to a registered identity.
    async fn enroll(&self, identity: &str, image: Vec<u8>) -> fdo::Result<String> {
        tracing::info!(identity, "enroll requested");
        let capture = capture_from(image)?;
        let enrollment = self
            .engine
            .enroll(identity.to_string(), capture)
            .await
            .map_err(to_fdo)?;
        to_json(&enrollment)
    }

    /// Add or update a registry profile. Empty department means none.
    async fn register_profile(&self, identity: &str, name: &str, department: &str) -> fdo::Result<bool> {
        tracing::info!(identity, "register_profile requested");
        let profile = Profile {
            identity_id: identity.trim().to_string(),
            name: name.trim().to_string(),
            department: Some(department.trim().to_string()).filter(|d| !d.is_empty()),
        };
        self.engine.register_profile(profile).await.map_err(to_fdo)?;
        Ok(true)
    }

    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        Ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "terminal_id": self.terminal_id,
            "collection_id": self.collection_id,
            "match_threshold": self.match_threshold,
            "sharpness_threshold": self.sharpness_threshold,
        })
        .to_string())
    }
}
