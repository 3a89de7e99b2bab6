//! Collapsing display statuses back into the persisted vocabulary.
//!
//! Every edit commits through [`commit_edit`], so the status that reaches the
//! store is always one of [`StorableStatus`]: lateness is re-derived on every
//! read and never written.

use std::fmt;

use chrono::{DateTime, TimeZone};

use crate::lifecycle::pause::PauseInfo;
use crate::lifecycle::status::derive_display_status;
use crate::lifecycle::LifecycleFields;
use crate::model::{DisplayStatus, StorableStatus, StoredStatus};

/// Proposed lifecycle columns for one entity. `None` leaves a column as is;
/// `pause_info: Some(None)` clears the pause snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LifecycleWrite {
    pub status: Option<StorableStatus>,
    pub completed_at: Option<String>,
    pub pause_info: Option<Option<PauseInfo>>,
    pub progress: Option<i32>,
}

pub fn normalize_for_storage(display: DisplayStatus, current: StoredStatus) -> StorableStatus {
    let storable = match display {
        DisplayStatus::Locked => StorableStatus::Locked,
        DisplayStatus::Paused => StorableStatus::Paused,
        DisplayStatus::Completed | DisplayStatus::OverdueCompleted => StorableStatus::Completed,
        DisplayStatus::Active | DisplayStatus::OverdueUnfinished => StorableStatus::Active,
    };
    if StoredStatus::from(storable) != current {
        let shown = display.as_str();
        tracing::debug!(
            display = shown,
            from = current.as_str(),
            to = storable.as_str(),
            "status normalized for storage"
        );
    }
    storable
}

/// Plans the columns that change when `fields` moves to `target`.
///
/// `completed_at` is stamped only on the first move into `completed`. Entering
/// `paused` captures a snapshot with an empty reason; leaving it clears the
/// snapshot.
pub fn plan_transition<Tz>(
    fields: &LifecycleFields<'_>,
    target: StorableStatus,
    now: &DateTime<Tz>,
) -> LifecycleWrite
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut write = LifecycleWrite {
        status: Some(target),
        ..Default::default()
    };
    if target == StorableStatus::Completed && fields.completed_at.is_none() {
        write.completed_at = Some(now.to_rfc3339());
    }
    let was_paused = fields.status == StoredStatus::Paused;
    let now_paused = target == StorableStatus::Paused;
    if now_paused && !was_paused {
        write.pause_info = Some(Some(PauseInfo::capture("", fields.progress, now)));
    } else if was_paused && !now_paused {
        write.pause_info = Some(None);
    }
    write
}

/// Commits an edited entity.
///
/// `edited` carries the new field values with the stored status unchanged.
/// An explicit `requested` status wins; otherwise the edited entity's derived
/// display status is normalized, so progress reaching 100 commits as
/// `completed` and an elapsed deadline commits as `active`.
pub fn commit_edit<Tz>(
    edited: &LifecycleFields<'_>,
    requested: Option<StorableStatus>,
    now: &DateTime<Tz>,
) -> LifecycleWrite
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let display = match requested {
        Some(status) => DisplayStatus::from(status),
        None => derive_display_status(edited, now),
    };
    let target = normalize_for_storage(display, edited.status);
    plan_transition(edited, target, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    const DISPLAY: [DisplayStatus; 6] = [
        DisplayStatus::Locked,
        DisplayStatus::Active,
        DisplayStatus::Paused,
        DisplayStatus::Completed,
        DisplayStatus::OverdueUnfinished,
        DisplayStatus::OverdueCompleted,
    ];

    const STORED: [StoredStatus; 5] = [
        StoredStatus::Active,
        StoredStatus::Paused,
        StoredStatus::Completed,
        StoredStatus::Archived,
        StoredStatus::Locked,
    ];

    fn fields<'a>(status: StoredStatus, progress: i32) -> LifecycleFields<'a> {
        LifecycleFields {
            status,
            unlock_time: None,
            deadline: None,
            completed_at: None,
            progress,
        }
    }

    fn noon() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
            .unwrap()
    }

    #[test]
    fn normalization_table() {
        for current in STORED {
            assert_eq!(
                normalize_for_storage(DisplayStatus::Locked, current),
                StorableStatus::Locked
            );
            assert_eq!(
                normalize_for_storage(DisplayStatus::Paused, current),
                StorableStatus::Paused
            );
            assert_eq!(
                normalize_for_storage(DisplayStatus::Completed, current),
                StorableStatus::Completed
            );
            assert_eq!(
                normalize_for_storage(DisplayStatus::OverdueCompleted, current),
                StorableStatus::Completed
            );
            assert_eq!(
                normalize_for_storage(DisplayStatus::OverdueUnfinished, current),
                StorableStatus::Active
            );
            assert_eq!(
                normalize_for_storage(DisplayStatus::Active, current),
                StorableStatus::Active
            );
        }
    }

    /// An entity whose derived status at `noon()` is `display`.
    fn context_for<'a>(display: DisplayStatus) -> LifecycleFields<'a> {
        match display {
            DisplayStatus::Locked => LifecycleFields {
                unlock_time: Some("2030-01-01"),
                ..fields(StoredStatus::Active, 0)
            },
            DisplayStatus::Active => fields(StoredStatus::Active, 10),
            DisplayStatus::Paused => fields(StoredStatus::Paused, 10),
            DisplayStatus::Completed => fields(StoredStatus::Active, 100),
            DisplayStatus::OverdueUnfinished => LifecycleFields {
                deadline: Some("2024-06-30"),
                ..fields(StoredStatus::Active, 10)
            },
            DisplayStatus::OverdueCompleted => LifecycleFields {
                deadline: Some("2024-06-30"),
                completed_at: Some("2024-08-01T09:00:00Z"),
                ..fields(StoredStatus::Active, 100)
            },
        }
    }

    #[test]
    fn normalizing_twice_is_stable() {
        for display in DISPLAY {
            let context = context_for(display);
            assert_eq!(derive_display_status(&context, &noon()), display);
            for current in STORED {
                let once = normalize_for_storage(display, current);
                let saved = context.with_status(once.into());
                let rederived = derive_display_status(&saved, &noon());
                assert_eq!(normalize_for_storage(rederived, current), once, "{display:?}");
            }
        }
    }

    #[test]
    fn full_progress_commits_as_completed_with_timestamp() {
        let edited = LifecycleFields {
            deadline: Some("2024-06-30"),
            ..fields(StoredStatus::Active, 100)
        };
        let write = commit_edit(&edited, None, &noon());
        assert_eq!(write.status, Some(StorableStatus::Completed));
        assert_eq!(write.completed_at.as_deref(), Some("2025-01-01T12:00:00+01:00"));
        assert_eq!(write.pause_info, None);
    }

    #[test]
    fn overdue_entity_commits_as_active() {
        let edited = LifecycleFields {
            deadline: Some("2024-06-30"),
            ..fields(StoredStatus::Active, 30)
        };
        let write = commit_edit(&edited, None, &noon());
        assert_eq!(write.status, Some(StorableStatus::Active));
        assert_eq!(write.completed_at, None);
    }

    #[test]
    fn completion_timestamp_is_never_overwritten() {
        let edited = LifecycleFields {
            completed_at: Some("2024-05-01T08:00:00Z"),
            ..fields(StoredStatus::Completed, 100)
        };
        let write = commit_edit(&edited, Some(StorableStatus::Completed), &noon());
        assert_eq!(write.status, Some(StorableStatus::Completed));
        assert_eq!(write.completed_at, None);
    }

    #[test]
    fn requested_pause_captures_snapshot_and_leaving_clears_it() {
        let write = commit_edit(
            &fields(StoredStatus::Active, 35),
            Some(StorableStatus::Paused),
            &noon(),
        );
        let info = write.pause_info.flatten().expect("pause snapshot");
        assert_eq!(info.reason, "");
        assert_eq!(info.progress_snapshot, 35);

        let write = commit_edit(
            &fields(StoredStatus::Paused, 35),
            Some(StorableStatus::Active),
            &noon(),
        );
        assert_eq!(write.pause_info, Some(None));
    }

    #[test]
    fn paused_entity_stays_paused_on_plain_edit() {
        let write = commit_edit(&fields(StoredStatus::Paused, 100), None, &noon());
        assert_eq!(write.status, Some(StorableStatus::Paused));
        assert_eq!(write.pause_info, None);
        assert_eq!(write.completed_at, None);
    }
}
