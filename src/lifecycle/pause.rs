//! Pause snapshots.
//!
//! Pausing records why and when an entity stopped together with its progress
//! at that moment. The snapshot lives until the entity leaves `paused`, and
//! resume clears it.

use std::fmt;

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::lifecycle::normalize::{normalize_for_storage, plan_transition, LifecycleWrite};
use crate::lifecycle::status::derive_display_status;
use crate::lifecycle::LifecycleFields;
use crate::model::{StorableStatus, StoredStatus};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PauseInfo {
    pub reason: String,
    pub paused_at: String,
    pub progress_snapshot: i32,
}

impl PauseInfo {
    pub fn capture<Tz>(reason: &str, progress: i32, now: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        Self {
            reason: reason.to_string(),
            paused_at: now.to_rfc3339(),
            progress_snapshot: progress,
        }
    }

    /// Rebuilds a snapshot from its stored columns. A row without `paused_at`
    /// has no snapshot.
    pub fn from_columns(
        reason: Option<&str>,
        paused_at: Option<&str>,
        progress_snapshot: Option<i32>,
    ) -> Option<Self> {
        let paused_at = paused_at?;
        Some(Self {
            reason: reason.unwrap_or_default().to_string(),
            paused_at: paused_at.to_string(),
            progress_snapshot: progress_snapshot.unwrap_or_default(),
        })
    }
}

/// Moves an entity into `paused`, capturing `reason` with the snapshot.
pub fn pause_write<Tz>(
    fields: &LifecycleFields<'_>,
    reason: &str,
    now: &DateTime<Tz>,
) -> LifecycleWrite
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut write = plan_transition(fields, StorableStatus::Paused, now);
    write.pause_info = Some(Some(PauseInfo::capture(reason, fields.progress, now)));
    write
}

/// Moves a paused entity back out of `paused`.
///
/// The resumed status is whatever the entity derives to once it is no longer
/// paused, normalized for storage. With `restore`, progress is reset to the
/// snapshot taken at pause time.
pub fn resume_write<Tz>(
    fields: &LifecycleFields<'_>,
    snapshot: Option<&PauseInfo>,
    restore: bool,
    now: &DateTime<Tz>,
) -> LifecycleWrite
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let restored = if restore {
        snapshot.map(|info| info.progress_snapshot)
    } else {
        None
    };
    let basis = LifecycleFields {
        progress: restored.unwrap_or(fields.progress),
        ..*fields
    };
    let display = derive_display_status(&basis.with_status(StoredStatus::Active), now);
    let target = normalize_for_storage(display, basis.status);
    let mut write = plan_transition(&basis, target, now);
    write.progress = restored;
    write
}
