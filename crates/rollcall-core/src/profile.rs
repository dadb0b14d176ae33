use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Display attributes for an enrolled identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub identity_id: String,
    pub name: String,
    pub department: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    #[error("profile directory unavailable: {0}")]
    Unavailable(String),
    #[error("invalid profile: {0}")]
    Invalid(String),
}

/// Registry of people allowed to enroll, and their display names.
pub trait ProfileDirectory: Send {
    fn lookup(&self, identity_id: &str) -> Result<Option<Profile>, ProfileError>;
    fn upsert(&self, profile: &Profile) -> Result<(), ProfileError>;
}

impl Profile {
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.identity_id.trim().is_empty() {
            return Err(ProfileError::Invalid("identity id is empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(ProfileError::Invalid("name is empty".into()));
        }
        Ok(())
    }
}

/// Display name for `identity_id`, falling back to the bare label.
///
/// A missing profile or an unreachable directory never blocks recording.
pub fn display_name(directory: &dyn ProfileDirectory, identity_id: &str) -> String {
    match directory.lookup(identity_id) {
        Ok(Some(profile)) => profile.name,
        Ok(None) => identity_id.to_string(),
        Err(err) => {
            tracing::warn!(identity = identity_id, error = %err, "profile lookup failed; using identity label");
            identity_id.to_string()
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryProfiles {
    profiles: Arc<Mutex<HashMap<String, Profile>>>,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileDirectory for MemoryProfiles {
    fn lookup(&self, identity_id: &str) -> Result<Option<Profile>, ProfileError> {
        let profiles = self
            .profiles
            .lock()
            .map_err(|_| ProfileError::Unavailable("lock poisoned".into()))?;
        Ok(profiles.get(identity_id).cloned())
    }

    fn upsert(&self, profile: &Profile) -> Result<(), ProfileError> {
        profile.validate()?;
        let mut profiles = self
            .profiles
            .lock()
            .map_err(|_| ProfileError::Unavailable("lock poisoned".into()))?;
        profiles.insert(profile.identity_id.clone(), profile.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Down;

    impl ProfileDirectory for Down {
        fn lookup(&self, _: &str) -> Result<Option<Profile>, ProfileError> {
            Err(ProfileError::Unavailable("connection refused".into()))
        }

        fn upsert(&self, _: &Profile) -> Result<(), ProfileError> {
            Err(ProfileError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn test_display_name_uses_profile() {
        let dir = MemoryProfiles::new();
        dir.upsert(&Profile {
            identity_id: "EMP2025".into(),
            name: "Asha Rao".into(),
            department: Some("Finance".into()),
        })
        .unwrap();
        assert_eq!(display_name(&dir, "EMP2025"), "Asha Rao");
    }

    #[test]
    fn test_display_name_falls_back_when_missing() {
        assert_eq!(display_name(&MemoryProfiles::new(), "EMP7"), "EMP7");
    }

    #[test]
    fn test_display_name_falls_back_when_unavailable() {
        assert_eq!(display_name(&Down, "EMP7"), "EMP7");
    }

    #[test]
    fn test_blank_profile_rejected() {
        let err = MemoryProfiles::new()
            .upsert(&Profile {
                identity_id: " ".into(),
                name: "x".into(),
                department: None,
            })
            .unwrap_err();
        assert!(matches!(err, ProfileError::Invalid(_)));
    }
}
