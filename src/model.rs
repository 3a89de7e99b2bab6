use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entities::{chapter, quest, season, task};
use crate::lifecycle::normalize::LifecycleWrite;

/// Persisted lifecycle status. Lateness is never one of these values.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredStatus {
    Active,
    Paused,
    Completed,
    Archived,
    Locked,
}

impl StoredStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
            Self::Locked => "locked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            "locked" => Some(Self::Locked),
            _ => None,
        }
    }
}

/// The subset of [`StoredStatus`] a form edit is allowed to commit.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorableStatus {
    Active,
    Paused,
    Completed,
    Locked,
}

impl StorableStatus {
    pub fn as_str(&self) -> &'static str {
        StoredStatus::from(*self).as_str()
    }
}

impl From<StorableStatus> for StoredStatus {
    fn from(value: StorableStatus) -> Self {
        match value {
            StorableStatus::Active => Self::Active,
            StorableStatus::Paused => Self::Paused,
            StorableStatus::Completed => Self::Completed,
            StorableStatus::Locked => Self::Locked,
        }
    }
}

/// Read-only classification shown to the user. Never written back as-is.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Locked,
    Active,
    Paused,
    Completed,
    OverdueUnfinished,
    OverdueCompleted,
}

impl DisplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::OverdueUnfinished => "overdue_unfinished",
            Self::OverdueCompleted => "overdue_completed",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed | Self::OverdueCompleted)
    }

    pub fn is_overdue(&self) -> bool {
        matches!(self, Self::OverdueUnfinished | Self::OverdueCompleted)
    }

    /// A locked entity takes no progress edits and no new children.
    pub fn is_actionable(&self) -> bool {
        *self != Self::Locked
    }
}

impl From<StorableStatus> for DisplayStatus {
    fn from(value: StorableStatus) -> Self {
        match value {
            StorableStatus::Active => Self::Active,
            StorableStatus::Paused => Self::Paused,
            StorableStatus::Completed => Self::Completed,
            StorableStatus::Locked => Self::Locked,
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Season,
    Chapter,
    Quest,
    Task,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Season => "season",
            Self::Chapter => "chapter",
            Self::Quest => "quest",
            Self::Task => "task",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Season => "Season",
            Self::Chapter => "Chapter",
            Self::Quest => "Quest",
            Self::Task => "Task",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SeasonInput {
    pub title: String,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChapterInput {
    pub season_id: i64,
    pub title: String,
    pub unlock_time: Option<String>,
    pub deadline: Option<String>,
    pub progress: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuestInput {
    pub title: String,
    pub season_id: Option<i64>,
    pub chapter_id: Option<i64>,
    pub unlock_time: Option<String>,
    pub deadline: Option<String>,
    pub progress: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TaskInput {
    pub title: String,
    pub quest_id: Option<i64>,
    pub season_id: Option<i64>,
}

// `Some(None)` clears a date; `None` leaves it untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SeasonChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<Option<String>>,
    pub end_date: Option<Option<String>>,
    pub status: Option<StorableStatus>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChapterChanges {
    pub title: Option<String>,
    pub unlock_time: Option<Option<String>>,
    pub deadline: Option<Option<String>>,
    pub progress: Option<i32>,
    pub status: Option<StorableStatus>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuestChanges {
    pub title: Option<String>,
    pub season_id: Option<Option<i64>>,
    pub chapter_id: Option<Option<i64>>,
    pub unlock_time: Option<Option<String>>,
    pub deadline: Option<Option<String>>,
    pub progress: Option<i32>,
    pub status: Option<StorableStatus>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuestQuery {
    pub season_id: Option<i64>,
    pub chapter_id: Option<i64>,
    pub status: Option<DisplayStatus>,
}

/// Partial write accepted by the store for any lifecycle-bearing entity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityWrite {
    pub lifecycle: LifecycleWrite,
    pub review: Option<String>,
    pub review_satisfaction: Option<i32>,
}

/// Everything the store holds, as read in one pass.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub seasons: Vec<season::Model>,
    pub history: Vec<season::Model>,
    pub chapters: Vec<chapter::Model>,
    pub quests: Vec<quest::Model>,
    pub tasks: Vec<task::Model>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProgressRatio {
    pub numerator: u32,
    pub denominator: u32,
}

/// One row of the command-center overview.
#[derive(Clone, Debug, Serialize)]
pub struct StatusView {
    pub kind: EntityKind,
    pub id: i64,
    pub title: String,
    pub stored_status: String,
    pub display_status: DisplayStatus,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<ProgressRatio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}
