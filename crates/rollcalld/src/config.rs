use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use rollcall_core::EngineSettings;
use rollcall_face::FaceClientConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("{key} must be within 0–100, got {value}")]
    OutOfRange { key: &'static str, value: f32 },
    #[error("unknown bus {0:?} (expected \"system\" or \"session\")")]
    UnknownBus(String),
}

/// Which D-Bus bus the daemon claims its name on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    System,
    Session,
}

impl std::str::FromStr for BusKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(BusKind::System),
            "session" => Ok(BusKind::Session),
            other => Err(ConfigError::UnknownBus(other.to_string())),
        }
    }
}

/// Optional TOML layer. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    face_service_url: Option<String>,
    face_service_token: Option<String>,
    collection_id: Option<String>,
    db_path: Option<PathBuf>,
    match_threshold: Option<f32>,
    sharpness_threshold: Option<f32>,
    conflict_retries: Option<u32>,
    service_retries: Option<u32>,
    request_timeout_secs: Option<u64>,
    terminal_id: Option<String>,
    bus: Option<BusKind>,
}

/// Daemon configuration: defaults, overlaid by the TOML file named in
/// `ROLLCALL_CONFIG`, overlaid by `ROLLCALL_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the face detection / match service.
    pub face_service_url: String,
    pub face_service_token: Option<String>,
    /// Face collection searched during matching.
    pub collection_id: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Minimum similarity (0–100) for a positive match.
    pub match_threshold: f32,
    /// Minimum sharpness (0–100) for a usable capture.
    pub sharpness_threshold: f32,
    pub conflict_retries: u32,
    pub service_retries: u32,
    pub request_timeout_secs: u64,
    /// Recorded on every event this daemon appends.
    pub terminal_id: String,
    pub bus: BusKind,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => read_file(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = env("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let bus = match env("ROLLCALL_BUS") {
            Some(v) => v.parse()?,
            None => file.bus.unwrap_or(BusKind::System),
        };

        let config = Self {
            face_service_url: env("ROLLCALL_FACE_SERVICE_URL")
                .or(file.face_service_url)
                .unwrap_or_else(|| "http://127.0.0.1:8700".to_string()),
            face_service_token: env("ROLLCALL_FACE_SERVICE_TOKEN")
                .or(file.face_service_token)
                .filter(|t| !t.is_empty()),
            collection_id: env("ROLLCALL_COLLECTION_ID")
                .or(file.collection_id)
                .unwrap_or_else(|| "attendance".to_string()),
            db_path: env("ROLLCALL_DB_PATH")
                .map(PathBuf::from)
                .or(file.db_path)
                .unwrap_or_else(|| data_dir.join("attendance.db")),
            match_threshold: parsed(&env, "ROLLCALL_MATCH_THRESHOLD")
                .or(file.match_threshold)
                .unwrap_or(90.0),
            sharpness_threshold: parsed(&env, "ROLLCALL_SHARPNESS_THRESHOLD")
                .or(file.sharpness_threshold)
                .unwrap_or(30.0),
            conflict_retries: parsed(&env, "ROLLCALL_CONFLICT_RETRIES")
                .or(file.conflict_retries)
                .unwrap_or(1),
            service_retries: parsed(&env, "ROLLCALL_SERVICE_RETRIES")
                .or(file.service_retries)
                .unwrap_or(0),
            request_timeout_secs: parsed(&env, "ROLLCALL_REQUEST_TIMEOUT_SECS")
                .or(file.request_timeout_secs)
                .unwrap_or(10),
            terminal_id: env("ROLLCALL_TERMINAL_ID")
                .or(file.terminal_id)
                .or_else(|| env("HOSTNAME"))
                .or_else(read_hostname)
                .unwrap_or_else(|| "terminal".to_string()),
            bus,
        };

        check_percent("match_threshold", config.match_threshold)?;
        check_percent("sharpness_threshold", config.sharpness_threshold)?;
        Ok(config)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            collection_id: self.collection_id.clone(),
            match_threshold: self.match_threshold,
            sharpness_threshold: self.sharpness_threshold,
            conflict_retries: self.conflict_retries,
            service_retries: self.service_retries,
            terminal_id: Some(self.terminal_id.clone()),
        }
    }

    /// Defaults rooted in `dir`, independent of the process environment.
    #[cfg(test)]
    pub(crate) fn for_tests(dir: &Path) -> Self {
        let home = dir.display().to_string();
        let mut config = Self::resolve(FileConfig::default(), move |key| {
            (key == "HOME").then(|| home.clone())
        })
        .expect("default config is valid");
        config.db_path = dir.join("attendance.db");
        config.terminal_id = "test-terminal".into();
        config
    }

    pub fn face_client_config(&self) -> FaceClientConfig {
        FaceClientConfig {
            base_url: self.face_service_url.clone(),
            token: self.face_service_token.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.trim().parse().ok())
}

fn read_hostname() -> Option<String> {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

fn check_percent(key: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { key, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(
            FileConfig::default(),
            env_from(&[("HOME", "/home/kiosk"), ("HOSTNAME", "lobby-1")]),
        )
        .unwrap();
        assert_eq!(config.match_threshold, 90.0);
        assert_eq!(config.sharpness_threshold, 30.0);
        assert_eq!(config.conflict_retries, 1);
        assert_eq!(config.service_retries, 0);
        assert_eq!(config.terminal_id, "lobby-1");
        assert_eq!(config.bus, BusKind::System);
        assert_eq!(
            config.db_path,
            PathBuf::from("/home/kiosk/.local/share/rollcall/attendance.db")
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            match_threshold = 80.0
            collection_id = "EmployeeFaces"
            bus = "session"
            "#,
        )
        .unwrap();
        let config = Config::resolve(
            file,
            env_from(&[("ROLLCALL_MATCH_THRESHOLD", "95"), ("HOME", "/root")]),
        )
        .unwrap();
        assert_eq!(config.match_threshold, 95.0);
        assert_eq!(config.collection_id, "EmployeeFaces");
        assert_eq!(config.bus, BusKind::Session);
    }

    #[test]
    fn test_unparsable_env_falls_back() {
        let config = Config::resolve(
            FileConfig::default(),
            env_from(&[("ROLLCALL_SERVICE_RETRIES", "lots"), ("HOME", "/root")]),
        )
        .unwrap();
        assert_eq!(config.service_retries, 0);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let err = Config::resolve(
            FileConfig::default(),
            env_from(&[("ROLLCALL_SHARPNESS_THRESHOLD", "130"), ("HOME", "/root")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { key: "sharpness_threshold", .. }));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        assert!(toml::from_str::<FileConfig>("camera_device = \"/dev/video2\"").is_err());
    }

    #[test]
    fn test_engine_settings_carry_policy() {
        let config = Config::resolve(
            FileConfig::default(),
            env_from(&[("ROLLCALL_TERMINAL_ID", "gate-b"), ("HOME", "/root")]),
        )
        .unwrap();
        let settings = config.engine_settings();
        assert_eq!(settings.terminal_id.as_deref(), Some("gate-b"));
        assert_eq!(settings.collection_id, "attendance");
    }
}
