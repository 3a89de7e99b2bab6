//! Completion-review trigger.
//!
//! A [`ReviewWatcher`] lives for one page session. It is fed every snapshot
//! the store settles on and opens at most one review prompt for an entity
//! that newly reached `completed`.
//!
//! The first observation only records what is already complete, so mounting
//! on a store full of finished work prompts for nothing. Entities that already
//! carry a review are marked seen without a prompt. A prompt that is dismissed
//! without a review is not reopened: the entity is already seen.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone};
use tracing::debug;

use crate::entities::{chapter, quest, season};
use crate::lifecycle::status::display_status;
use crate::lifecycle::{Lifecycle, SeasonProgress};
use crate::model::{EntityKind, Snapshot, StoredStatus};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }
}

/// The entity handed to the review UI.
#[derive(Clone, Copy, Debug)]
pub enum ReviewTarget<'a> {
    Season(&'a season::Model),
    Chapter(&'a chapter::Model),
    Quest(&'a quest::Model),
}

impl ReviewTarget<'_> {
    pub fn key(&self) -> EntityKey {
        match self {
            Self::Season(season) => EntityKey::new(EntityKind::Season, season.id),
            Self::Chapter(chapter) => EntityKey::new(EntityKind::Chapter, chapter.id),
            Self::Quest(quest) => EntityKey::new(EntityKind::Quest, quest.id),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Season(season) => &season.title,
            Self::Chapter(chapter) => &chapter.title,
            Self::Quest(quest) => &quest.title,
        }
    }
}

/// Receives review prompts. The UI later reports back through
/// [`ReviewWatcher::prompt_closed`].
pub trait ReviewSink {
    fn on_entity_needs_review(&mut self, kind: EntityKind, target: ReviewTarget<'_>);
}

impl<F> ReviewSink for F
where
    F: FnMut(EntityKind, ReviewTarget<'_>),
{
    fn on_entity_needs_review(&mut self, kind: EntityKind, target: ReviewTarget<'_>) {
        self(kind, target)
    }
}

struct Completed<'a> {
    key: EntityKey,
    target: ReviewTarget<'a>,
    reviewed: bool,
}

#[derive(Debug, Default)]
pub struct ReviewWatcher {
    seen: HashSet<EntityKey>,
    initialized: bool,
    open_prompt: Option<EntityKey>,
}

impl ReviewWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_prompt(&self) -> Option<EntityKey> {
        self.open_prompt
    }

    /// Called when the review UI is submitted or dismissed.
    pub fn prompt_closed(&mut self) {
        self.open_prompt = None;
    }

    /// Observes one settled snapshot and returns the entity a prompt was
    /// opened for, if any.
    pub fn observe<Tz: TimeZone>(
        &mut self,
        snapshot: &Snapshot,
        now: &DateTime<Tz>,
        sink: &mut dyn ReviewSink,
    ) -> Option<EntityKey> {
        let completed = completed_entities(snapshot, now);

        if !self.initialized {
            self.seen = completed.iter().map(|entry| entry.key).collect();
            self.initialized = true;
            debug!(completed = self.seen.len(), "review watcher initialized");
            return None;
        }

        let candidate = completed
            .iter()
            .find(|entry| !entry.reviewed && !self.seen.contains(&entry.key))
            .map(|entry| (entry.key, entry.target));
        self.seen.extend(completed.iter().map(|entry| entry.key));

        let (key, target) = candidate?;
        if let Some(open) = self.open_prompt {
            debug!(kind = %key.kind, id = key.id, open_id = open.id, "review prompt already open");
            return None;
        }
        debug!(kind = %key.kind, id = key.id, "opening review prompt");
        self.open_prompt = Some(key);
        sink.on_entity_needs_review(key.kind, target);
        Some(key)
    }
}

fn is_completed<E: Lifecycle, Tz: TimeZone>(entity: &E, now: &DateTime<Tz>) -> bool {
    entity.fields().status == StoredStatus::Completed
        || display_status(entity, now).is_completed()
}

/// Completed entities in observation order: seasons, chapters, quests.
fn completed_entities<'a, Tz: TimeZone>(
    snapshot: &'a Snapshot,
    now: &DateTime<Tz>,
) -> Vec<Completed<'a>> {
    let mut completed = Vec::new();
    for season in &snapshot.seasons {
        let view = SeasonProgress::new(season, &snapshot.quests);
        if is_completed(&view, now) {
            completed.push(Completed {
                key: EntityKey::new(EntityKind::Season, season.id),
                target: ReviewTarget::Season(season),
                reviewed: view.has_review(),
            });
        }
    }
    for chapter in &snapshot.chapters {
        if is_completed(chapter, now) {
            completed.push(Completed {
                key: EntityKey::new(EntityKind::Chapter, chapter.id),
                target: ReviewTarget::Chapter(chapter),
                reviewed: chapter.has_review(),
            });
        }
    }
    for quest in &snapshot.quests {
        if is_completed(quest, now) {
            completed.push(Completed {
                key: EntityKey::new(EntityKind::Quest, quest.id),
                target: ReviewTarget::Quest(quest),
                reviewed: quest.has_review(),
            });
        }
    }
    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::fixtures;
    use chrono::{FixedOffset, Local};

    #[derive(Default)]
    struct Recorder {
        prompts: Vec<EntityKey>,
    }

    impl ReviewSink for Recorder {
        fn on_entity_needs_review(&mut self, kind: EntityKind, target: ReviewTarget<'_>) {
            assert_eq!(kind, target.key().kind);
            self.prompts.push(target.key());
        }
    }

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2025, 1, 1, 12, 0, 0)
            .unwrap()
    }

    fn quest_key(id: i64) -> EntityKey {
        EntityKey::new(EntityKind::Quest, id)
    }

    fn sink_fn<F: FnMut(EntityKind, ReviewTarget<'_>)>(sink: F) -> F {
        sink
    }

    fn snapshot_with(quests: Vec<quest::Model>) -> Snapshot {
        Snapshot {
            quests,
            ..Default::default()
        }
    }

    fn finished(mut quest: quest::Model) -> quest::Model {
        quest.status = "completed".to_string();
        quest.progress = 100;
        quest
    }

    #[test]
    fn cold_start_with_completed_entities_prompts_nothing() {
        let quests = (1..=5)
            .map(|id| finished(fixtures::quest(id, None, 100)))
            .collect();
        let snapshot = snapshot_with(quests);
        let mut watcher = ReviewWatcher::new();
        let mut recorder = Recorder::default();

        assert_eq!(watcher.observe(&snapshot, &now(), &mut recorder), None);
        assert!(watcher.initialized);
        assert!(recorder.prompts.is_empty());
        assert_eq!(watcher.observe(&snapshot, &now(), &mut recorder), None);
        assert!(recorder.prompts.is_empty());
    }

    #[test]
    fn newly_completed_entity_is_prompted_after_mount() {
        let a = finished(fixtures::quest(1, None, 100));
        let b = fixtures::quest(2, None, 30);
        let mut watcher = ReviewWatcher::new();
        let mut recorder = Recorder::default();

        let before = snapshot_with(vec![a.clone(), b.clone()]);
        watcher.observe(&before, &now(), &mut recorder);
        assert!(recorder.prompts.is_empty());

        let snapshot = snapshot_with(vec![a, finished(b)]);
        let opened = watcher.observe(&snapshot, &now(), &mut recorder);
        assert_eq!(opened, Some(quest_key(2)));
        assert_eq!(recorder.prompts, vec![quest_key(2)]);
        assert_eq!(watcher.open_prompt(), Some(quest_key(2)));
    }

    #[test]
    fn a_completion_is_prompted_exactly_once() {
        let mut quest = fixtures::quest(7, None, 90);
        let mut watcher = ReviewWatcher::new();
        let mut recorder = Recorder::default();
        watcher.observe(&snapshot_with(vec![quest.clone()]), &now(), &mut recorder);

        quest.progress = 100;
        let snapshot = snapshot_with(vec![quest]);
        for _ in 0..100 {
            watcher.observe(&snapshot, &now(), &mut recorder);
            watcher.prompt_closed();
        }
        assert_eq!(recorder.prompts, vec![quest_key(7)]);
    }

    #[test]
    fn reviewed_entities_are_marked_seen_silently() {
        let mut watcher = ReviewWatcher::new();
        let mut recorder = Recorder::default();
        watcher.observe(&Snapshot::default(), &now(), &mut recorder);

        let mut imported = finished(fixtures::quest(3, None, 100));
        imported.review = Some("went well".to_string());
        watcher.observe(&snapshot_with(vec![imported.clone()]), &now(), &mut recorder);
        assert!(recorder.prompts.is_empty());
        assert!(watcher.seen.contains(&quest_key(3)));

        imported.review = None;
        watcher.observe(&snapshot_with(vec![imported]), &now(), &mut recorder);
        assert!(recorder.prompts.is_empty());
    }

    #[test]
    fn only_one_prompt_is_open_at_a_time() {
        let mut watcher = ReviewWatcher::new();
        let mut recorder = Recorder::default();
        let first = fixtures::quest(1, None, 0);
        let second = fixtures::quest(2, None, 0);
        let before = snapshot_with(vec![first.clone(), second.clone()]);
        watcher.observe(&before, &now(), &mut recorder);

        let snapshot = snapshot_with(vec![finished(first), second.clone()]);
        watcher.observe(&snapshot, &now(), &mut recorder);
        assert_eq!(watcher.open_prompt(), Some(quest_key(1)));

        let both = vec![finished(fixtures::quest(1, None, 0)), finished(second)];
        let snapshot = snapshot_with(both);
        assert_eq!(watcher.observe(&snapshot, &now(), &mut recorder), None);
        assert_eq!(recorder.prompts, vec![quest_key(1)]);

        // The second completion was seen while the first prompt was open.
        watcher.prompt_closed();
        assert_eq!(watcher.observe(&snapshot, &now(), &mut recorder), None);
        assert_eq!(recorder.prompts, vec![quest_key(1)]);
    }

    #[test]
    fn dismissed_prompt_is_not_reopened() {
        let mut watcher = ReviewWatcher::new();
        let mut recorder = Recorder::default();
        let quest = fixtures::quest(4, None, 50);
        watcher.observe(&snapshot_with(vec![quest.clone()]), &now(), &mut recorder);

        let snapshot = snapshot_with(vec![finished(quest)]);
        watcher.observe(&snapshot, &now(), &mut recorder);
        watcher.prompt_closed();
        watcher.observe(&snapshot, &now(), &mut recorder);
        assert_eq!(recorder.prompts, vec![quest_key(4)]);
    }

    #[test]
    fn remounting_reinitializes_from_current_snapshot() {
        let quest = finished(fixtures::quest(5, None, 100));
        let snapshot = snapshot_with(vec![quest]);
        let mut recorder = Recorder::default();

        let mut first_mount = ReviewWatcher::new();
        first_mount.observe(&snapshot_with(Vec::new()), &now(), &mut recorder);
        drop(first_mount);

        let mut second_mount = ReviewWatcher::new();
        assert_eq!(second_mount.observe(&snapshot, &now(), &mut recorder), None);
        assert!(recorder.prompts.is_empty());
    }

    #[test]
    fn seasons_complete_through_aggregated_quests() {
        let season = fixtures::season(1);
        let mut linked = fixtures::quest(1, Some(1), 60);
        let mut watcher = ReviewWatcher::new();
        let mut recorder = Recorder::default();
        let before = Snapshot {
            seasons: vec![season.clone()],
            quests: vec![linked.clone()],
            ..Default::default()
        };
        watcher.observe(&before, &now(), &mut recorder);

        linked.progress = 100;
        let after = Snapshot {
            seasons: vec![season],
            quests: vec![linked],
            ..Default::default()
        };
        // The season and its quest complete together; seasons are observed first.
        let opened = watcher.observe(&after, &now(), &mut recorder);
        assert_eq!(opened, Some(EntityKey::new(EntityKind::Season, 1)));
        assert!(watcher.seen.contains(&quest_key(1)));
    }

    #[test]
    fn overdue_completion_counts_as_completed() {
        let mut chapter = fixtures::chapter(9, 1);
        chapter.deadline = Some("2024-01-01".to_string());
        let mut watcher = ReviewWatcher::new();
        let mut prompts = Vec::new();
        let mut sink = sink_fn(|kind, target| {
            prompts.push((kind, target.title().to_string()));
        });
        let before = Snapshot {
            chapters: vec![chapter.clone()],
            ..Default::default()
        };
        watcher.observe(&before, &Local::now(), &mut sink);

        chapter.progress = 100;
        chapter.completed_at = Some("2024-03-01T00:00:00Z".to_string());
        let after = Snapshot {
            chapters: vec![chapter],
            ..Default::default()
        };
        watcher.observe(&after, &Local::now(), &mut sink);
        assert_eq!(prompts, vec![(EntityKind::Chapter, "Chapter 9".to_string())]);
    }
}
