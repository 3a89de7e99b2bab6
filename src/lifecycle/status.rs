//! Display-status derivation.
//!
//! The display status is a priority-ordered chain of predicates over a few
//! time-resolved facts: the first rule that holds wins, otherwise the entity
//! is `active`. Chapters, quests and seasons share the same chain.

use chrono::{DateTime, TimeZone};

use crate::entities::{chapter, quest, season};
use crate::lifecycle::calendar::{end_of_day, parse_local_date_in, parse_timestamp_in};
use crate::lifecycle::{Lifecycle, LifecycleFields, SeasonProgress};
use crate::model::{DisplayStatus, StoredStatus};

/// Facts resolved against one instant and time zone.
#[derive(Clone, Copy, Debug)]
struct Facts {
    paused: bool,
    before_unlock: bool,
    completed: bool,
    finished_late: bool,
    past_deadline: bool,
}

type Rule = (fn(&Facts) -> bool, DisplayStatus);

fn paused(facts: &Facts) -> bool {
    facts.paused
}

fn before_unlock(facts: &Facts) -> bool {
    facts.before_unlock
}

fn completed_late(facts: &Facts) -> bool {
    facts.completed && facts.finished_late
}

fn completed(facts: &Facts) -> bool {
    facts.completed
}

fn unfinished_past_deadline(facts: &Facts) -> bool {
    !facts.completed && facts.past_deadline
}

const RULES: [Rule; 5] = [
    (paused, DisplayStatus::Paused),
    (before_unlock, DisplayStatus::Locked),
    (completed_late, DisplayStatus::OverdueCompleted),
    (completed, DisplayStatus::Completed),
    (unfinished_past_deadline, DisplayStatus::OverdueUnfinished),
];

impl Facts {
    fn resolve<Tz: TimeZone>(fields: &LifecycleFields<'_>, now: &DateTime<Tz>) -> Self {
        let tz = now.timezone();
        let unlock = fields
            .unlock_time
            .and_then(|value| parse_local_date_in(value, &tz));
        let deadline_end = fields
            .deadline
            .and_then(|value| parse_local_date_in(value, &tz))
            .map(|start| end_of_day(&start));
        let completed_at = fields
            .completed_at
            .and_then(|value| parse_timestamp_in(value, &tz));

        Self {
            paused: fields.status == StoredStatus::Paused,
            before_unlock: unlock.as_ref().is_some_and(|unlock| now < unlock),
            completed: fields.status == StoredStatus::Completed || fields.progress >= 100,
            finished_late: match (&deadline_end, &completed_at) {
                (Some(end), Some(done)) => done > end,
                _ => false,
            },
            past_deadline: deadline_end.as_ref().is_some_and(|end| now > end),
        }
    }
}

/// Derives the display status of one entity at `now`.
///
/// The zone of `now` is the user's calendar: unlock dates start at its local
/// midnight and deadlines end at its local 23:59:59.999.
pub fn derive_display_status<Tz: TimeZone>(
    fields: &LifecycleFields<'_>,
    now: &DateTime<Tz>,
) -> DisplayStatus {
    let facts = Facts::resolve(fields, now);
    RULES
        .iter()
        .find(|(applies, _)| applies(&facts))
        .map(|(_, status)| *status)
        .unwrap_or(DisplayStatus::Active)
}

pub fn display_status<E: Lifecycle, Tz: TimeZone>(
    entity: &E,
    now: &DateTime<Tz>,
) -> DisplayStatus {
    derive_display_status(&entity.fields(), now)
}

pub fn derive_chapter_status<Tz: TimeZone>(
    chapter: &chapter::Model,
    now: &DateTime<Tz>,
) -> DisplayStatus {
    display_status(chapter, now)
}

pub fn derive_quest_status<Tz: TimeZone>(
    quest: &quest::Model,
    now: &DateTime<Tz>,
) -> DisplayStatus {
    display_status(quest, now)
}

/// Seasons derive from their aggregated quest progress, never a stored value.
pub fn derive_season_status<Tz: TimeZone>(
    season: &season::Model,
    quests: &[quest::Model],
    now: &DateTime<Tz>,
) -> DisplayStatus {
    display_status(&SeasonProgress::new(season, quests), now)
}
