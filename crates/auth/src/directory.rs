//! User directory capability: resolve who a user is and what role they hold.
//!
//! Identity issuance is outside this system; the directory is the read side
//! the settlement core consults (payee checks, notification fan-out).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradelane_core::{RecordState, Role, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub state: RecordState,
}

impl UserRecord {
    pub fn new(id: UserId, name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role,
            state: RecordState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

/// User document from a directory export that predates [`RecordState`]:
/// deletion is an optional `isDeleted` flag beside loose metadata.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyUserRecord {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub is_deleted: Option<bool>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_by: Option<UserId>,
}

impl LegacyUserRecord {
    pub fn migrate(self, migrated_at: DateTime<Utc>) -> UserRecord {
        UserRecord {
            id: self.id,
            name: self.name,
            email: self.email,
            role: self.role,
            state: RecordState::from_legacy_flag(
                self.is_deleted,
                self.deleted_at,
                self.deleted_by,
                migrated_at,
            ),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user already registered: {0}")]
    Duplicate(String),

    #[error("user not found: {0}")]
    NotFound(UserId),

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

pub trait UserDirectory: Send + Sync {
    /// Lookup by id. Soft-deleted users are returned so callers can tell
    /// "deleted" from "never existed".
    fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, DirectoryError>;

    /// Active users holding any of `roles`.
    fn find_by_roles(&self, roles: &[Role]) -> Result<Vec<UserRecord>, DirectoryError>;

    fn register(&self, user: UserRecord) -> Result<(), DirectoryError>;

    fn soft_delete(
        &self,
        id: UserId,
        deleted_by: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError>;
}

impl<D> UserDirectory for Arc<D>
where
    D: UserDirectory + ?Sized,
{
    fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, DirectoryError> {
        (**self).find_by_id(id)
    }

    fn find_by_roles(&self, roles: &[Role]) -> Result<Vec<UserRecord>, DirectoryError> {
        (**self).find_by_roles(roles)
    }

    fn register(&self, user: UserRecord) -> Result<(), DirectoryError> {
        (**self).register(user)
    }

    fn soft_delete(
        &self,
        id: UserId,
        deleted_by: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        (**self).soft_delete(id, deleted_by, at)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, UserRecord>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register legacy documents, mapping each deletion flag exactly once.
    /// Returns how many records were imported.
    pub fn import_legacy(
        &self,
        records: Vec<LegacyUserRecord>,
        migrated_at: DateTime<Utc>,
    ) -> Result<usize, DirectoryError> {
        let count = records.len();
        for legacy in records {
            self.register(legacy.migrate(migrated_at))?;
        }
        tracing::info!(count, "legacy user records imported");
        Ok(count)
    }

    fn poisoned() -> DirectoryError {
        DirectoryError::Unavailable("lock poisoned".to_string())
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, DirectoryError> {
        let users = self.users.read().map_err(|_| Self::poisoned())?;
        Ok(users.get(&id).cloned())
    }

    fn find_by_roles(&self, roles: &[Role]) -> Result<Vec<UserRecord>, DirectoryError> {
        let users = self.users.read().map_err(|_| Self::poisoned())?;
        let mut found: Vec<UserRecord> = users
            .values()
            .filter(|u| u.is_active() && roles.contains(&u.role))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(found)
    }

    fn register(&self, user: UserRecord) -> Result<(), DirectoryError> {
        let mut users = self.users.write().map_err(|_| Self::poisoned())?;
        let email = user.email.trim().to_ascii_lowercase();
        if users.contains_key(&user.id)
            || users
                .values()
                .any(|u| u.email.trim().eq_ignore_ascii_case(&email))
        {
            return Err(DirectoryError::Duplicate(user.email));
        }
        users.insert(user.id, user);
        Ok(())
    }

    fn soft_delete(
        &self,
        id: UserId,
        deleted_by: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), DirectoryError> {
        let mut users = self.users.write().map_err(|_| Self::poisoned())?;
        let user = users
            .get_mut(&id)
            .filter(|u| u.is_active())
            .ok_or(DirectoryError::NotFound(id))?;
        user.state = RecordState::Deleted {
            deleted_at: at,
            deleted_by: Some(deleted_by),
        };
        Ok(())
    }
}
