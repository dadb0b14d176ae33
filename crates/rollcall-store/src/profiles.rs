use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use rollcall_core::{Profile, ProfileDirectory, ProfileError};

use crate::schema::{self, StoreError, TIMESTAMP_FORMAT};

/// Registry of onboarded people (identity label, name, department).
pub struct SqliteProfiles {
    conn: Connection,
}

impl SqliteProfiles {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            conn: schema::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: schema::open_in_memory()?,
        })
    }

    pub fn list(&self) -> Result<Vec<Profile>, ProfileError> {
        let mut stmt = self
            .conn
            .prepare("SELECT identity_id, name, department FROM profiles ORDER BY identity_id")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Profile {
                    identity_id: row.get(0)?,
                    name: row.get(1)?,
                    department: row.get(2)?,
                })
            })
            .map_err(unavailable)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(unavailable)
    }
}

fn unavailable(err: rusqlite::Error) -> ProfileError {
    ProfileError::Unavailable(err.to_string())
}

impl ProfileDirectory for SqliteProfiles {
    fn lookup(&self, identity_id: &str) -> Result<Option<Profile>, ProfileError> {
        self.conn
            .query_row(
                "SELECT identity_id, name, department FROM profiles WHERE identity_id = ?1",
                params![identity_id],
                |row| {
                    Ok(Profile {
                        identity_id: row.get(0)?,
                        name: row.get(1)?,
                        department: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(unavailable)
    }

    fn upsert(&self, profile: &Profile) -> Result<(), ProfileError> {
        profile.validate()?;
        let now = chrono::Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string();
        self.conn
            .execute(
                "INSERT INTO profiles (identity_id, name, department, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(identity_id) DO UPDATE SET
                   name = excluded.name,
                   department = excluded.department",
                params![profile.identity_id, profile.name, profile.department, now],
            )
            .map_err(unavailable)?;
        Ok(())
    }
}
