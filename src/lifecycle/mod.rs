//! Lifecycle engine for seasons, chapters and quests.
//!
//! Everything here is pure: callers read entities from the store, pass them
//! through [`status::derive_display_status`] to decide what to show, commit
//! edits through [`normalize`], and feed each fresh snapshot to a
//! [`watcher::ReviewWatcher`]. Nothing in this module writes to the store.

pub mod calendar;
pub mod normalize;
pub mod pause;
pub mod progress;
pub mod status;
pub mod watcher;

use crate::entities::{chapter, quest, season};
use crate::model::{EntityKind, StoredStatus};

/// The fields every lifecycle rule reads, borrowed from one entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LifecycleFields<'a> {
    pub status: StoredStatus,
    pub unlock_time: Option<&'a str>,
    pub deadline: Option<&'a str>,
    pub completed_at: Option<&'a str>,
    pub progress: i32,
}

impl<'a> LifecycleFields<'a> {
    pub fn with_status(self, status: StoredStatus) -> Self {
        Self { status, ..self }
    }
}

/// A chapter, quest or season as seen by the engine.
pub trait Lifecycle {
    fn kind(&self) -> EntityKind;
    fn id(&self) -> i64;
    fn fields(&self) -> LifecycleFields<'_>;
    fn has_review(&self) -> bool;
}

fn stored_status(kind: EntityKind, id: i64, value: &str) -> StoredStatus {
    StoredStatus::parse(value).unwrap_or_else(|| {
        tracing::warn!(%kind, id, status = value, "unknown stored status, reading as active");
        StoredStatus::Active
    })
}

impl Lifecycle for chapter::Model {
    fn kind(&self) -> EntityKind {
        EntityKind::Chapter
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> LifecycleFields<'_> {
        LifecycleFields {
            status: stored_status(EntityKind::Chapter, self.id, &self.status),
            unlock_time: self.unlock_time.as_deref(),
            deadline: self.deadline.as_deref(),
            completed_at: self.completed_at.as_deref(),
            progress: self.progress,
        }
    }

    fn has_review(&self) -> bool {
        self.review.is_some()
    }
}

impl Lifecycle for quest::Model {
    fn kind(&self) -> EntityKind {
        EntityKind::Quest
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn fields(&self) -> LifecycleFields<'_> {
        LifecycleFields {
            status: stored_status(EntityKind::Quest, self.id, &self.status),
            unlock_time: self.unlock_time.as_deref(),
            deadline: self.deadline.as_deref(),
            completed_at: self.completed_at.as_deref(),
            progress: self.progress,
        }
    }

    fn has_review(&self) -> bool {
        self.review.is_some()
    }
}

/// A season paired with the progress aggregated from its linked quests.
///
/// Seasons never store progress, so they only take part in lifecycle rules
/// through this view.
#[derive(Clone, Copy, Debug)]
pub struct SeasonProgress<'a> {
    pub season: &'a season::Model,
    pub progress: i32,
}

impl<'a> SeasonProgress<'a> {
    pub fn new(season: &'a season::Model, quests: &[quest::Model]) -> Self {
        Self {
            season,
            progress: progress::aggregate_season_progress(season, quests),
        }
    }
}

impl<'a> SeasonProgress<'a> {
    pub fn into_fields(self) -> LifecycleFields<'a> {
        LifecycleFields {
            status: stored_status(EntityKind::Season, self.season.id, &self.season.status),
            unlock_time: self.season.start_date.as_deref(),
            deadline: self.season.end_date.as_deref(),
            completed_at: self.season.completed_at.as_deref(),
            progress: self.progress,
        }
    }
}

impl Lifecycle for SeasonProgress<'_> {
    fn kind(&self) -> EntityKind {
        EntityKind::Season
    }

    fn id(&self) -> i64 {
        self.season.id
    }

    fn fields(&self) -> LifecycleFields<'_> {
        self.into_fields()
    }

    fn has_review(&self) -> bool {
        self.season.review.is_some()
    }
}
