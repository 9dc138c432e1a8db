//! Soft-delete lifecycle shared by records that are never hard-removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Lifecycle of a soft-deletable record.
///
/// Queries match on the variant; there is no "flag may be absent" state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordState {
    #[default]
    Active,
    Deleted {
        deleted_at: DateTime<Utc>,
        deleted_by: Option<UserId>,
    },
}

impl RecordState {
    pub fn is_active(&self) -> bool {
        matches!(self, RecordState::Active)
    }

    pub fn is_deleted(&self) -> bool {
        !self.is_active()
    }

    /// One-shot migration from legacy documents carrying an optional
    /// `isDeleted` boolean plus loose `deletedAt`/`deletedBy` fields.
    ///
    /// A missing flag means the record predates soft delete and is active.
    /// A set flag without a timestamp is stamped with `migrated_at`.
    pub fn from_legacy_flag(
        is_deleted: Option<bool>,
        deleted_at: Option<DateTime<Utc>>,
        deleted_by: Option<UserId>,
        migrated_at: DateTime<Utc>,
    ) -> Self {
        match is_deleted {
            Some(true) => RecordState::Deleted {
                deleted_at: deleted_at.unwrap_or(migrated_at),
                deleted_by,
            },
            Some(false) | None => RecordState::Active,
        }
    }
}
