use chrono::{DateTime, Local, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::info;

use crate::entities::{chapter, quest, season, task};
use crate::error::AppError;
use crate::lifecycle::calendar::parse_calendar_date;
use crate::lifecycle::normalize::{commit_edit, plan_transition, LifecycleWrite};
use crate::lifecycle::pause::{pause_write, resume_write, PauseInfo};
use crate::lifecycle::progress::{
    aggregate_season_progress, chapter_progress_ratio, linked_quest_count,
};
use crate::lifecycle::status::{
    derive_chapter_status, derive_display_status, derive_quest_status, derive_season_status,
};
use crate::lifecycle::{Lifecycle, LifecycleFields, SeasonProgress};
use crate::model::{
    ChapterChanges, ChapterInput, DisplayStatus, EntityKind, EntityWrite, QuestChanges, QuestInput,
    QuestQuery, SeasonChanges, SeasonInput, Snapshot, StatusView, StorableStatus, StoredStatus,
    TaskInput,
};

pub const MIN_SATISFACTION: i32 = 1;
pub const MAX_SATISFACTION: i32 = 5;

pub struct App {
    db: DatabaseConnection,
}

/// A lifecycle-bearing row loaded for a status mutation.
enum Loaded {
    Season {
        season: season::Model,
        progress: i32,
    },
    Chapter(chapter::Model),
    Quest(quest::Model),
}

impl Loaded {
    fn fields(&self) -> LifecycleFields<'_> {
        match self {
            Self::Season { season, progress } => SeasonProgress {
                season,
                progress: *progress,
            }
            .into_fields(),
            Self::Chapter(chapter) => chapter.fields(),
            Self::Quest(quest) => quest.fields(),
        }
    }

    fn pause_info(&self) -> Option<PauseInfo> {
        let (reason, paused_at, progress) = match self {
            Self::Season { season, .. } => {
                (&season.pause_reason, &season.paused_at, season.pause_progress)
            }
            Self::Chapter(chapter) => {
                (&chapter.pause_reason, &chapter.paused_at, chapter.pause_progress)
            }
            Self::Quest(quest) => (&quest.pause_reason, &quest.paused_at, quest.pause_progress),
        };
        PauseInfo::from_columns(reason.as_deref(), paused_at.as_deref(), progress)
    }
}

impl App {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Reads every entity in one pass. Archived seasons land in `history`.
    pub async fn snapshot(&self) -> Result<Snapshot, AppError> {
        let all_seasons = season::Entity::find()
            .order_by_asc(season::Column::Id)
            .all(&self.db)
            .await?;
        let (history, seasons): (Vec<_>, Vec<_>) = all_seasons
            .into_iter()
            .partition(|season| season.status == StoredStatus::Archived.as_str());
        let chapters = chapter::Entity::find()
            .order_by_asc(chapter::Column::SeasonId)
            .order_by_asc(chapter::Column::Id)
            .all(&self.db)
            .await?;
        let quests = quest::Entity::find()
            .order_by_asc(quest::Column::Id)
            .all(&self.db)
            .await?;
        let tasks = task::Entity::find()
            .order_by_asc(task::Column::Id)
            .all(&self.db)
            .await?;
        Ok(Snapshot {
            seasons,
            history,
            chapters,
            quests,
            tasks,
        })
    }

    pub async fn get_chapter(&self, id: i64) -> Result<chapter::Model, AppError> {
        find_chapter(&self.db, id).await
    }

    pub async fn get_quest(&self, id: i64) -> Result<quest::Model, AppError> {
        find_quest(&self.db, id).await
    }

    pub async fn get_task(&self, id: i64) -> Result<task::Model, AppError> {
        task::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("task id {id}")))
    }

    pub async fn quests_for_season(&self, season_id: i64) -> Result<Vec<quest::Model>, AppError> {
        quests_for_season(&self.db, season_id).await
    }

    pub async fn list_seasons(
        &self,
        include_archived: bool,
    ) -> Result<Vec<season::Model>, AppError> {
        let mut select = season::Entity::find();
        if !include_archived {
            select = select.filter(season::Column::Status.ne(StoredStatus::Archived.as_str()));
        }
        Ok(select.order_by_asc(season::Column::Id).all(&self.db).await?)
    }

    pub async fn list_chapters(
        &self,
        season_id: Option<i64>,
    ) -> Result<Vec<chapter::Model>, AppError> {
        let mut select = chapter::Entity::find();
        if let Some(season_id) = season_id {
            select = select.filter(chapter::Column::SeasonId.eq(season_id));
        }
        Ok(select
            .order_by_asc(chapter::Column::SeasonId)
            .order_by_asc(chapter::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn list_quests(
        &self,
        query: &QuestQuery,
        now: &DateTime<Local>,
    ) -> Result<Vec<quest::Model>, AppError> {
        let mut select = quest::Entity::find();
        if let Some(season_id) = query.season_id {
            select = select.filter(quest::Column::SeasonId.eq(season_id));
        }
        if let Some(chapter_id) = query.chapter_id {
            select = select.filter(quest::Column::ChapterId.eq(chapter_id));
        }
        let quests = select.order_by_asc(quest::Column::Id).all(&self.db).await?;
        Ok(match query.status {
            Some(status) => quests
                .into_iter()
                .filter(|quest| derive_quest_status(quest, now) == status)
                .collect(),
            None => quests,
        })
    }

    pub async fn list_tasks(
        &self,
        quest_id: Option<i64>,
        season_id: Option<i64>,
    ) -> Result<Vec<task::Model>, AppError> {
        let mut select = task::Entity::find();
        if let Some(quest_id) = quest_id {
            select = select.filter(task::Column::QuestId.eq(quest_id));
        }
        if let Some(season_id) = season_id {
            select = select.filter(task::Column::SeasonId.eq(season_id));
        }
        Ok(select.order_by_asc(task::Column::Id).all(&self.db).await?)
    }

    pub async fn status_views(&self, now: &DateTime<Local>) -> Result<Vec<StatusView>, AppError> {
        let snapshot = self.snapshot().await?;
        Ok(status_views(&snapshot, now))
    }

    pub async fn add_season(
        &self,
        input: SeasonInput,
        now: &DateTime<Local>,
    ) -> Result<season::Model, AppError> {
        ensure_non_empty("season title", &input.title)?;
        ensure_date("start date", input.start_date.as_deref())?;
        ensure_date("end date", input.end_date.as_deref())?;
        ensure_date_order(input.start_date.as_deref(), input.end_date.as_deref())?;

        let fields = LifecycleFields {
            status: StoredStatus::Active,
            unlock_time: input.start_date.as_deref(),
            deadline: input.end_date.as_deref(),
            completed_at: None,
            progress: 0,
        };
        let lifecycle = commit_edit(&fields, None, now);
        let stamp = now.with_timezone(&Utc);
        let mut active = season::ActiveModel {
            title: Set(input.title),
            description: Set(input.description),
            start_date: Set(input.start_date),
            end_date: Set(input.end_date),
            created_at: Set(stamp),
            updated_at: Set(stamp),
            ..Default::default()
        };
        apply_season_write(
            &mut active,
            EntityWrite {
                lifecycle,
                ..Default::default()
            },
        );

        let insert = season::Entity::insert(active).exec(&self.db).await?;
        let created = find_season(&self.db, insert.last_insert_id).await?;
        info!(kind = "season", id = created.id, status = %created.status, "season created");
        Ok(created)
    }

    pub async fn add_chapter(
        &self,
        input: ChapterInput,
        now: &DateTime<Local>,
    ) -> Result<chapter::Model, AppError> {
        ensure_non_empty("chapter title", &input.title)?;
        ensure_date("unlock time", input.unlock_time.as_deref())?;
        ensure_date("deadline", input.deadline.as_deref())?;
        ensure_date_order(input.unlock_time.as_deref(), input.deadline.as_deref())?;
        ensure_progress(input.progress)?;

        let season = find_season(&self.db, input.season_id).await?;
        ensure_season_open(&season)?;
        let quests = quests_for_season(&self.db, season.id).await?;
        ensure_accepts_children(
            EntityKind::Season,
            season.id,
            derive_season_status(&season, &quests, now),
        )?;

        let fields = LifecycleFields {
            status: StoredStatus::Active,
            unlock_time: input.unlock_time.as_deref(),
            deadline: input.deadline.as_deref(),
            completed_at: None,
            progress: input.progress,
        };
        let lifecycle = commit_edit(&fields, None, now);
        let stamp = now.with_timezone(&Utc);
        let mut active = chapter::ActiveModel {
            season_id: Set(season.id),
            title: Set(input.title),
            unlock_time: Set(input.unlock_time),
            deadline: Set(input.deadline),
            progress: Set(input.progress),
            created_at: Set(stamp),
            updated_at: Set(stamp),
            ..Default::default()
        };
        apply_chapter_write(
            &mut active,
            EntityWrite {
                lifecycle,
                ..Default::default()
            },
        );

        let insert = chapter::Entity::insert(active).exec(&self.db).await?;
        let created = find_chapter(&self.db, insert.last_insert_id).await?;
        info!(kind = "chapter", id = created.id, status = %created.status, "chapter created");
        Ok(created)
    }

    /// Creates a quest. A quest placed in a chapter joins that chapter's
    /// season unless another season is named, which is rejected.
    pub async fn add_quest(
        &self,
        input: QuestInput,
        now: &DateTime<Local>,
    ) -> Result<quest::Model, AppError> {
        ensure_non_empty("quest title", &input.title)?;
        ensure_date("unlock time", input.unlock_time.as_deref())?;
        ensure_date("deadline", input.deadline.as_deref())?;
        ensure_date_order(input.unlock_time.as_deref(), input.deadline.as_deref())?;
        ensure_progress(input.progress)?;

        let mut season_id = input.season_id;
        if let Some(chapter_id) = input.chapter_id {
            let chapter = find_chapter(&self.db, chapter_id).await?;
            ensure_accepts_children(
                EntityKind::Chapter,
                chapter.id,
                derive_chapter_status(&chapter, now),
            )?;
            match season_id {
                Some(id) if id != chapter.season_id => {
                    return Err(chapter_season_mismatch(&chapter, Some(id)));
                }
                _ => season_id = Some(chapter.season_id),
            }
        }
        if let Some(id) = season_id {
            let season = find_season(&self.db, id).await?;
            ensure_season_open(&season)?;
            let quests = quests_for_season(&self.db, id).await?;
            ensure_accepts_children(
                EntityKind::Season,
                id,
                derive_season_status(&season, &quests, now),
            )?;
        }

        let fields = LifecycleFields {
            status: StoredStatus::Active,
            unlock_time: input.unlock_time.as_deref(),
            deadline: input.deadline.as_deref(),
            completed_at: None,
            progress: input.progress,
        };
        let lifecycle = commit_edit(&fields, None, now);
        let stamp = now.with_timezone(&Utc);
        let mut active = quest::ActiveModel {
            season_id: Set(season_id),
            chapter_id: Set(input.chapter_id),
            title: Set(input.title),
            unlock_time: Set(input.unlock_time),
            deadline: Set(input.deadline),
            progress: Set(input.progress),
            created_at: Set(stamp),
            updated_at: Set(stamp),
            ..Default::default()
        };
        apply_quest_write(
            &mut active,
            EntityWrite {
                lifecycle,
                ..Default::default()
            },
        );

        let txn = self.db.begin().await?;
        let result: Result<quest::Model, AppError> = async {
            let insert = quest::Entity::insert(active).exec(&txn).await?;
            let created = find_quest(&txn, insert.last_insert_id).await?;
            if let Some(season_id) = created.season_id {
                sync_season_with_conn(&txn, season_id, now).await?;
            }
            Ok(created)
        }
        .await;
        let created = finalize_transaction(txn, result).await?;
        info!(kind = "quest", id = created.id, status = %created.status, "quest created");
        Ok(created)
    }

    pub async fn add_task(
        &self,
        input: TaskInput,
        now: &DateTime<Local>,
    ) -> Result<task::Model, AppError> {
        ensure_non_empty("task title", &input.title)?;
        if let Some(quest_id) = input.quest_id {
            find_quest(&self.db, quest_id).await?;
        }
        if let Some(season_id) = input.season_id {
            find_season(&self.db, season_id).await?;
        }
        let stamp = now.with_timezone(&Utc);
        let active = task::ActiveModel {
            title: Set(input.title),
            done: Set(false),
            quest_id: Set(input.quest_id),
            season_id: Set(input.season_id),
            created_at: Set(stamp),
            updated_at: Set(stamp),
            ..Default::default()
        };
        let insert = task::Entity::insert(active).exec(&self.db).await?;
        let created = self.get_task(insert.last_insert_id).await?;
        info!(kind = "task", id = created.id, "task created");
        Ok(created)
    }

    pub async fn update_season(
        &self,
        id: i64,
        changes: SeasonChanges,
        now: &DateTime<Local>,
    ) -> Result<season::Model, AppError> {
        let txn = self.db.begin().await?;
        let result = update_season_with_conn(&txn, id, changes, now).await;
        finalize_transaction(txn, result).await
    }

    pub async fn update_chapter(
        &self,
        id: i64,
        changes: ChapterChanges,
        now: &DateTime<Local>,
    ) -> Result<chapter::Model, AppError> {
        let txn = self.db.begin().await?;
        let result = update_chapter_with_conn(&txn, id, changes, now).await;
        finalize_transaction(txn, result).await
    }

    pub async fn update_quest(
        &self,
        id: i64,
        changes: QuestChanges,
        now: &DateTime<Local>,
    ) -> Result<quest::Model, AppError> {
        let txn = self.db.begin().await?;
        let result = update_quest_with_conn(&txn, id, changes, now).await;
        finalize_transaction(txn, result).await
    }

    pub async fn pause(
        &self,
        kind: EntityKind,
        id: i64,
        reason: &str,
        now: &DateTime<Local>,
    ) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        let result: Result<(), AppError> = async {
            let loaded = load_for_change(&txn, kind, id).await?;
            let fields = loaded.fields();
            if fields.status == StoredStatus::Paused {
                return Err(AppError::InvalidInput(format!("{kind} id {id} is already paused")));
            }
            let finished = fields.status == StoredStatus::Completed
                || derive_display_status(&fields, now).is_completed();
            if finished {
                return Err(AppError::InvalidInput(format!(
                    "{kind} id {id} is completed and cannot be paused"
                )));
            }
            let lifecycle = pause_write(&fields, reason.trim(), now);
            let write = EntityWrite {
                lifecycle,
                ..Default::default()
            };
            write_with_conn(&txn, kind, id, write, now.with_timezone(&Utc)).await
        }
        .await;
        finalize_transaction(txn, result).await
    }

    /// Moves a paused entity back to whatever it derives to. With `restore`,
    /// progress returns to the value captured at pause time.
    pub async fn resume(
        &self,
        kind: EntityKind,
        id: i64,
        restore: bool,
        now: &DateTime<Local>,
    ) -> Result<(), AppError> {
        if restore && kind == EntityKind::Season {
            return Err(AppError::InvalidInput(
                "season progress comes from its quests and cannot be restored".to_string(),
            ));
        }
        let txn = self.db.begin().await?;
        let result: Result<(), AppError> = async {
            let loaded = load_for_change(&txn, kind, id).await?;
            let fields = loaded.fields();
            if fields.status != StoredStatus::Paused {
                return Err(AppError::InvalidInput(format!("{kind} id {id} is not paused")));
            }
            let snapshot = loaded.pause_info();
            let lifecycle = resume_write(&fields, snapshot.as_ref(), restore, now);
            let write = EntityWrite {
                lifecycle,
                ..Default::default()
            };
            write_with_conn(&txn, kind, id, write, now.with_timezone(&Utc)).await?;
            if let Loaded::Quest(quest::Model {
                season_id: Some(season_id),
                ..
            }) = &loaded
            {
                sync_season_with_conn(&txn, *season_id, now).await?;
            }
            Ok(())
        }
        .await;
        finalize_transaction(txn, result).await
    }

    pub async fn submit_review(
        &self,
        kind: EntityKind,
        id: i64,
        review: &str,
        satisfaction: i32,
        now: &DateTime<Local>,
    ) -> Result<(), AppError> {
        ensure_non_empty("review", review)?;
        if !(MIN_SATISFACTION..=MAX_SATISFACTION).contains(&satisfaction) {
            return Err(AppError::InvalidInput(format!(
                "satisfaction must be {MIN_SATISFACTION}..={MAX_SATISFACTION}, got {satisfaction}"
            )));
        }
        let loaded = load_for_change(&self.db, kind, id).await?;
        let fields = loaded.fields();
        let display = derive_display_status(&fields, now);
        if fields.status != StoredStatus::Completed && !display.is_completed() {
            return Err(AppError::InvalidInput(format!(
                "{kind} id {id} is {display}; only completed entities take a review"
            )));
        }
        // A stored completion keeps its own timestamp.
        let lifecycle = if fields.status == StoredStatus::Completed {
            LifecycleWrite::default()
        } else {
            plan_transition(&fields, StorableStatus::Completed, now)
        };
        let write = EntityWrite {
            lifecycle,
            review: Some(review.trim().to_string()),
            review_satisfaction: Some(satisfaction),
        };
        self.write(kind, id, write, now).await
    }

    /// Last-write-wins partial update of lifecycle and review columns.
    pub async fn write(
        &self,
        kind: EntityKind,
        id: i64,
        write: EntityWrite,
        now: &DateTime<Local>,
    ) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        let result: Result<(), AppError> = async {
            let moves_progress = write.lifecycle.progress.is_some();
            write_with_conn(&txn, kind, id, write, now.with_timezone(&Utc)).await?;
            if kind == EntityKind::Quest && moves_progress {
                if let Some(season_id) = find_quest(&txn, id).await?.season_id {
                    sync_season_with_conn(&txn, season_id, now).await?;
                }
            }
            Ok(())
        }
        .await;
        finalize_transaction(txn, result).await
    }

    pub async fn archive_season(
        &self,
        id: i64,
        now: &DateTime<Local>,
    ) -> Result<season::Model, AppError> {
        let season = find_season(&self.db, id).await?;
        ensure_season_open(&season)?;
        let stamp = now.with_timezone(&Utc);
        let active = season::ActiveModel {
            id: Set(id),
            status: Set(StoredStatus::Archived.as_str().to_string()),
            archived_at: Set(Some(stamp)),
            updated_at: Set(stamp),
            ..Default::default()
        };
        let model = active
            .update(&self.db)
            .await
            .map_err(|err| update_error(EntityKind::Season, id, err))?;
        info!(kind = "season", id, "season archived");
        Ok(model)
    }

    /// Deletes a chapter. Quests that pointed at it keep the dangling id.
    pub async fn remove_chapter(&self, id: i64) -> Result<(), AppError> {
        let result = chapter::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("chapter id {id}")));
        }
        info!(kind = "chapter", id, "chapter removed");
        Ok(())
    }

    /// Deletes a quest and re-commits the season it counted towards.
    pub async fn remove_quest(&self, id: i64, now: &DateTime<Local>) -> Result<(), AppError> {
        let txn = self.db.begin().await?;
        let result: Result<(), AppError> = async {
            let quest = find_quest(&txn, id).await?;
            quest::Entity::delete_by_id(id).exec(&txn).await?;
            if let Some(season_id) = quest.season_id {
                sync_season_with_conn(&txn, season_id, now).await?;
            }
            Ok(())
        }
        .await;
        finalize_transaction(txn, result).await?;
        info!(kind = "quest", id, "quest removed");
        Ok(())
    }

    pub async fn remove_task(&self, id: i64) -> Result<(), AppError> {
        let result = task::Entity::delete_by_id(id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("task id {id}")));
        }
        info!(kind = "task", id, "task removed");
        Ok(())
    }

    pub async fn set_task_done(
        &self,
        id: i64,
        done: bool,
        now: &DateTime<Local>,
    ) -> Result<task::Model, AppError> {
        let active = task::ActiveModel {
            id: Set(id),
            done: Set(done),
            updated_at: Set(now.with_timezone(&Utc)),
            ..Default::default()
        };
        let model = active
            .update(&self.db)
            .await
            .map_err(|err| update_error(EntityKind::Task, id, err))?;
        info!(kind = "task", id, done, "task updated");
        Ok(model)
    }
}

/// Overview rows for every open season, chapter and quest, in that order.
pub fn status_views(snapshot: &Snapshot, now: &DateTime<Local>) -> Vec<StatusView> {
    let mut views = Vec::new();
    for season in &snapshot.seasons {
        let progress = aggregate_season_progress(season, &snapshot.quests);
        views.push(StatusView {
            kind: EntityKind::Season,
            id: season.id,
            title: season.title.clone(),
            stored_status: season.status.clone(),
            display_status: derive_season_status(season, &snapshot.quests, now),
            progress,
            ratio: None,
            parent_id: None,
        });
    }
    for chapter in &snapshot.chapters {
        let linked = linked_quest_count(chapter.id, &snapshot.quests);
        views.push(StatusView {
            kind: EntityKind::Chapter,
            id: chapter.id,
            title: chapter.title.clone(),
            stored_status: chapter.status.clone(),
            display_status: derive_chapter_status(chapter, now),
            progress: chapter.progress,
            ratio: Some(chapter_progress_ratio(chapter, linked)),
            parent_id: Some(chapter.season_id),
        });
    }
    for quest in &snapshot.quests {
        views.push(StatusView {
            kind: EntityKind::Quest,
            id: quest.id,
            title: quest.title.clone(),
            stored_status: quest.status.clone(),
            display_status: derive_quest_status(quest, now),
            progress: quest.progress,
            ratio: None,
            parent_id: quest.chapter_id.or(quest.season_id),
        });
    }
    views
}

async fn find_season<C: ConnectionTrait>(db: &C, id: i64) -> Result<season::Model, AppError> {
    season::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("season id {id}")))
}

async fn find_chapter<C: ConnectionTrait>(db: &C, id: i64) -> Result<chapter::Model, AppError> {
    chapter::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("chapter id {id}")))
}

async fn find_quest<C: ConnectionTrait>(db: &C, id: i64) -> Result<quest::Model, AppError> {
    quest::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("quest id {id}")))
}

async fn quests_for_season<C: ConnectionTrait>(
    db: &C,
    season_id: i64,
) -> Result<Vec<quest::Model>, AppError> {
    Ok(quest::Entity::find()
        .filter(quest::Column::SeasonId.eq(season_id))
        .order_by_asc(quest::Column::Id)
        .all(db)
        .await?)
}

async fn load_for_change<C: ConnectionTrait>(
    db: &C,
    kind: EntityKind,
    id: i64,
) -> Result<Loaded, AppError> {
    match kind {
        EntityKind::Season => {
            let season = find_season(db, id).await?;
            ensure_season_open(&season)?;
            let quests = quests_for_season(db, id).await?;
            let progress = aggregate_season_progress(&season, &quests);
            Ok(Loaded::Season { season, progress })
        }
        EntityKind::Chapter => Ok(Loaded::Chapter(find_chapter(db, id).await?)),
        EntityKind::Quest => Ok(Loaded::Quest(find_quest(db, id).await?)),
        EntityKind::Task => Err(no_lifecycle(id)),
    }
}

async fn update_season_with_conn<C: ConnectionTrait>(
    db: &C,
    id: i64,
    changes: SeasonChanges,
    now: &DateTime<Local>,
) -> Result<season::Model, AppError> {
    if let Some(title) = changes.title.as_deref() {
        ensure_non_empty("season title", title)?;
    }
    ensure_date_change("start date", &changes.start_date)?;
    ensure_date_change("end date", &changes.end_date)?;

    let current = find_season(db, id).await?;
    ensure_season_open(&current)?;
    let quests = quests_for_season(db, id).await?;
    ensure_not_reopened(
        EntityKind::Season,
        id,
        SeasonProgress::new(&current, &quests).fields().status,
        changes.status,
    )?;

    let mut edited = current.clone();
    if let Some(title) = changes.title {
        edited.title = title;
    }
    if let Some(description) = changes.description {
        edited.description = Some(description).filter(|text| !text.trim().is_empty());
    }
    if let Some(start_date) = changes.start_date {
        edited.start_date = start_date;
    }
    if let Some(end_date) = changes.end_date {
        edited.end_date = end_date;
    }
    ensure_date_order(edited.start_date.as_deref(), edited.end_date.as_deref())?;

    let lifecycle = commit_edit(
        &SeasonProgress::new(&edited, &quests).fields(),
        changes.status,
        now,
    );
    let mut active = season::ActiveModel {
        id: Set(id),
        title: Set(edited.title),
        description: Set(edited.description),
        start_date: Set(edited.start_date),
        end_date: Set(edited.end_date),
        updated_at: Set(now.with_timezone(&Utc)),
        ..Default::default()
    };
    apply_season_write(
        &mut active,
        EntityWrite {
            lifecycle,
            ..Default::default()
        },
    );

    let model = active
        .update(db)
        .await
        .map_err(|err| update_error(EntityKind::Season, id, err))?;
    info!(kind = "season", id, status = %model.status, "season updated");
    Ok(model)
}

async fn update_chapter_with_conn<C: ConnectionTrait>(
    db: &C,
    id: i64,
    changes: ChapterChanges,
    now: &DateTime<Local>,
) -> Result<chapter::Model, AppError> {
    if let Some(title) = changes.title.as_deref() {
        ensure_non_empty("chapter title", title)?;
    }
    ensure_date_change("unlock time", &changes.unlock_time)?;
    ensure_date_change("deadline", &changes.deadline)?;
    if let Some(progress) = changes.progress {
        ensure_progress(progress)?;
    }

    let current = find_chapter(db, id).await?;
    ensure_not_reopened(EntityKind::Chapter, id, current.fields().status, changes.status)?;
    if changes.progress.is_some() {
        ensure_accepts_progress(EntityKind::Chapter, id, derive_chapter_status(&current, now))?;
    }

    let mut edited = current.clone();
    if let Some(title) = changes.title {
        edited.title = title;
    }
    if let Some(unlock_time) = changes.unlock_time {
        edited.unlock_time = unlock_time;
    }
    if let Some(deadline) = changes.deadline {
        edited.deadline = deadline;
    }
    if let Some(progress) = changes.progress {
        edited.progress = progress;
    }
    ensure_date_order(edited.unlock_time.as_deref(), edited.deadline.as_deref())?;

    let lifecycle = commit_edit(&edited.fields(), changes.status, now);
    let mut active = chapter::ActiveModel {
        id: Set(id),
        title: Set(edited.title),
        unlock_time: Set(edited.unlock_time),
        deadline: Set(edited.deadline),
        progress: Set(edited.progress),
        updated_at: Set(now.with_timezone(&Utc)),
        ..Default::default()
    };
    apply_chapter_write(
        &mut active,
        EntityWrite {
            lifecycle,
            ..Default::default()
        },
    );

    let model = active
        .update(db)
        .await
        .map_err(|err| update_error(EntityKind::Chapter, id, err))?;
    info!(kind = "chapter", id, status = %model.status, "chapter updated");
    Ok(model)
}

async fn update_quest_with_conn<C: ConnectionTrait>(
    db: &C,
    id: i64,
    changes: QuestChanges,
    now: &DateTime<Local>,
) -> Result<quest::Model, AppError> {
    if let Some(title) = changes.title.as_deref() {
        ensure_non_empty("quest title", title)?;
    }
    ensure_date_change("unlock time", &changes.unlock_time)?;
    ensure_date_change("deadline", &changes.deadline)?;
    if let Some(progress) = changes.progress {
        ensure_progress(progress)?;
    }

    let current = find_quest(db, id).await?;
    ensure_not_reopened(EntityKind::Quest, id, current.fields().status, changes.status)?;
    if changes.progress.is_some() {
        ensure_accepts_progress(EntityKind::Quest, id, derive_quest_status(&current, now))?;
    }
    let season_change = relinked_season(db, &current, &changes, now).await?;
    if let Some(Some(season_id)) = season_change {
        let season = find_season(db, season_id).await?;
        ensure_season_open(&season)?;
        if current.season_id != Some(season_id) {
            let quests = quests_for_season(db, season_id).await?;
            ensure_accepts_children(
                EntityKind::Season,
                season_id,
                derive_season_status(&season, &quests, now),
            )?;
        }
    }

    let mut edited = current.clone();
    if let Some(title) = changes.title {
        edited.title = title;
    }
    if let Some(season_id) = season_change {
        edited.season_id = season_id;
    }
    if let Some(chapter_id) = changes.chapter_id {
        edited.chapter_id = chapter_id;
    }
    if let Some(unlock_time) = changes.unlock_time {
        edited.unlock_time = unlock_time;
    }
    if let Some(deadline) = changes.deadline {
        edited.deadline = deadline;
    }
    if let Some(progress) = changes.progress {
        edited.progress = progress;
    }
    ensure_date_order(edited.unlock_time.as_deref(), edited.deadline.as_deref())?;

    let lifecycle = commit_edit(&edited.fields(), changes.status, now);
    let mut active = quest::ActiveModel {
        id: Set(id),
        title: Set(edited.title),
        season_id: Set(edited.season_id),
        chapter_id: Set(edited.chapter_id),
        unlock_time: Set(edited.unlock_time),
        deadline: Set(edited.deadline),
        progress: Set(edited.progress),
        updated_at: Set(now.with_timezone(&Utc)),
        ..Default::default()
    };
    apply_quest_write(
        &mut active,
        EntityWrite {
            lifecycle,
            ..Default::default()
        },
    );

    let model = active
        .update(db)
        .await
        .map_err(|err| update_error(EntityKind::Quest, id, err))?;
    info!(kind = "quest", id, status = %model.status, "quest updated");

    let mut touched: Vec<i64> = current.season_id.into_iter().collect();
    touched.extend(model.season_id.filter(|season_id| Some(*season_id) != current.season_id));
    for season_id in touched {
        sync_season_with_conn(db, season_id, now).await?;
    }
    Ok(model)
}

/// Resolves the season a quest update ends up in. A quest moved into a
/// chapter joins the chapter's season; a quest staying in a chapter cannot
/// be moved to a different season.
async fn relinked_season<C: ConnectionTrait>(
    db: &C,
    current: &quest::Model,
    changes: &QuestChanges,
    now: &DateTime<Local>,
) -> Result<Option<Option<i64>>, AppError> {
    if let Some(Some(chapter_id)) = changes.chapter_id {
        let chapter = find_chapter(db, chapter_id).await?;
        if current.chapter_id != Some(chapter_id) {
            ensure_accepts_children(
                EntityKind::Chapter,
                chapter_id,
                derive_chapter_status(&chapter, now),
            )?;
        }
        return match changes.season_id {
            Some(requested) if requested != Some(chapter.season_id) => {
                Err(chapter_season_mismatch(&chapter, requested))
            }
            _ => Ok(Some(Some(chapter.season_id))),
        };
    }
    let Some(requested) = changes.season_id else {
        return Ok(None);
    };
    let chapter_id = changes.chapter_id.unwrap_or(current.chapter_id);
    if let Some(chapter_id) = chapter_id {
        // Dangling chapter links are tolerated.
        if let Some(chapter) = chapter::Entity::find_by_id(chapter_id).one(db).await? {
            if requested != Some(chapter.season_id) {
                return Err(chapter_season_mismatch(&chapter, requested));
            }
        }
    }
    Ok(Some(requested))
}

/// Re-commits a season after its quest set or quest progress changed, so a
/// season is stored as completed when its quests reach 100%.
async fn sync_season_with_conn<C: ConnectionTrait>(
    db: &C,
    season_id: i64,
    now: &DateTime<Local>,
) -> Result<(), AppError> {
    let Some(season) = season::Entity::find_by_id(season_id).one(db).await? else {
        return Ok(());
    };
    if season.status == StoredStatus::Archived.as_str() {
        return Ok(());
    }
    let quests = quests_for_season(db, season_id).await?;
    let fields = SeasonProgress::new(&season, &quests).into_fields();
    let lifecycle = commit_edit(&fields, None, now);
    let unchanged = lifecycle.status.map(StoredStatus::from) == Some(fields.status)
        && lifecycle.completed_at.is_none()
        && lifecycle.pause_info.is_none();
    if unchanged {
        return Ok(());
    }
    let write = EntityWrite {
        lifecycle,
        ..Default::default()
    };
    write_with_conn(db, EntityKind::Season, season_id, write, now.with_timezone(&Utc)).await
}

async fn write_with_conn<C: ConnectionTrait>(
    db: &C,
    kind: EntityKind,
    id: i64,
    write: EntityWrite,
    stamp: DateTime<Utc>,
) -> Result<(), AppError> {
    let status = write.lifecycle.status;
    let result = match kind {
        EntityKind::Season => {
            let mut active = season::ActiveModel {
                id: Set(id),
                updated_at: Set(stamp),
                ..Default::default()
            };
            apply_season_write(&mut active, write);
            active.update(db).await.map(|_| ())
        }
        EntityKind::Chapter => {
            let mut active = chapter::ActiveModel {
                id: Set(id),
                updated_at: Set(stamp),
                ..Default::default()
            };
            apply_chapter_write(&mut active, write);
            active.update(db).await.map(|_| ())
        }
        EntityKind::Quest => {
            let mut active = quest::ActiveModel {
                id: Set(id),
                updated_at: Set(stamp),
                ..Default::default()
            };
            apply_quest_write(&mut active, write);
            active.update(db).await.map(|_| ())
        }
        EntityKind::Task => return Err(no_lifecycle(id)),
    };
    result.map_err(|err| update_error(kind, id, err))?;
    info!(
        %kind,
        id,
        status = status.map(|status| status.as_str()).unwrap_or("unchanged"),
        "lifecycle written"
    );
    Ok(())
}

fn pause_columns(info: Option<PauseInfo>) -> (Option<String>, Option<String>, Option<i32>) {
    match info {
        Some(info) => (
            Some(info.reason).filter(|reason| !reason.is_empty()),
            Some(info.paused_at),
            Some(info.progress_snapshot),
        ),
        None => (None, None, None),
    }
}

// Seasons store no progress, so a progress write is ignored here.
fn apply_season_write(active: &mut season::ActiveModel, write: EntityWrite) {
    let EntityWrite {
        lifecycle,
        review,
        review_satisfaction,
    } = write;
    if let Some(status) = lifecycle.status {
        active.status = Set(status.as_str().to_string());
    }
    if let Some(completed_at) = lifecycle.completed_at {
        active.completed_at = Set(Some(completed_at));
    }
    if let Some(info) = lifecycle.pause_info {
        let (reason, paused_at, snapshot) = pause_columns(info);
        active.pause_reason = Set(reason);
        active.paused_at = Set(paused_at);
        active.pause_progress = Set(snapshot);
    }
    if let Some(review) = review {
        active.review = Set(Some(review));
    }
    if let Some(score) = review_satisfaction {
        active.review_satisfaction = Set(Some(score));
    }
}

fn apply_chapter_write(active: &mut chapter::ActiveModel, write: EntityWrite) {
    let EntityWrite {
        lifecycle,
        review,
        review_satisfaction,
    } = write;
    if let Some(status) = lifecycle.status {
        active.status = Set(status.as_str().to_string());
    }
    if let Some(completed_at) = lifecycle.completed_at {
        active.completed_at = Set(Some(completed_at));
    }
    if let Some(info) = lifecycle.pause_info {
        let (reason, paused_at, snapshot) = pause_columns(info);
        active.pause_reason = Set(reason);
        active.paused_at = Set(paused_at);
        active.pause_progress = Set(snapshot);
    }
    if let Some(progress) = lifecycle.progress {
        active.progress = Set(progress);
    }
    if let Some(review) = review {
        active.review = Set(Some(review));
    }
    if let Some(score) = review_satisfaction {
        active.review_satisfaction = Set(Some(score));
    }
}

fn apply_quest_write(active: &mut quest::ActiveModel, write: EntityWrite) {
    let EntityWrite {
        lifecycle,
        review,
        review_satisfaction,
    } = write;
    if let Some(status) = lifecycle.status {
        active.status = Set(status.as_str().to_string());
    }
    if let Some(completed_at) = lifecycle.completed_at {
        active.completed_at = Set(Some(completed_at));
    }
    if let Some(info) = lifecycle.pause_info {
        let (reason, paused_at, snapshot) = pause_columns(info);
        active.pause_reason = Set(reason);
        active.paused_at = Set(paused_at);
        active.pause_progress = Set(snapshot);
    }
    if let Some(progress) = lifecycle.progress {
        active.progress = Set(progress);
    }
    if let Some(review) = review {
        active.review = Set(Some(review));
    }
    if let Some(score) = review_satisfaction {
        active.review_satisfaction = Set(Some(score));
    }
}

fn update_error(kind: EntityKind, id: i64, err: DbErr) -> AppError {
    match err {
        DbErr::RecordNotFound(_) | DbErr::RecordNotUpdated => {
            AppError::NotFound(format!("{kind} id {id}"))
        }
        err => err.into(),
    }
}

fn no_lifecycle(id: i64) -> AppError {
    AppError::InvalidInput(format!("task id {id} has no lifecycle status"))
}

async fn finalize_transaction<T>(
    txn: DatabaseTransaction,
    result: Result<T, AppError>,
) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                return Err(rollback_err.into());
            }
            Err(err)
        }
    }
}

fn ensure_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}

fn ensure_progress(progress: i32) -> Result<(), AppError> {
    if !(0..=100).contains(&progress) {
        return Err(AppError::InvalidInput(format!(
            "progress must be between 0 and 100, got {progress}"
        )));
    }
    Ok(())
}

fn ensure_date(label: &str, value: Option<&str>) -> Result<(), AppError> {
    match value {
        Some(value) if parse_calendar_date(value).is_none() => Err(AppError::InvalidInput(
            format!("{label} '{value}' is not a YYYY-MM-DD date"),
        )),
        _ => Ok(()),
    }
}

fn ensure_date_change(label: &str, change: &Option<Option<String>>) -> Result<(), AppError> {
    ensure_date(label, change.as_ref().and_then(|value| value.as_deref()))
}

fn ensure_date_order(start: Option<&str>, end: Option<&str>) -> Result<(), AppError> {
    let (Some(start), Some(end)) = (
        start.and_then(parse_calendar_date),
        end.and_then(parse_calendar_date),
    ) else {
        return Ok(());
    };
    if start > end {
        return Err(AppError::InvalidInput(format!(
            "unlock date {start} is after deadline {end}"
        )));
    }
    Ok(())
}

fn chapter_season_mismatch(chapter: &chapter::Model, requested: Option<i64>) -> AppError {
    let requested = match requested {
        Some(id) => format!("season id {id}"),
        None => "no season".to_string(),
    };
    AppError::InvalidInput(format!(
        "chapter id {} belongs to season id {}, not {requested}",
        chapter.id, chapter.season_id
    ))
}

fn ensure_season_open(season: &season::Model) -> Result<(), AppError> {
    if season.status == StoredStatus::Archived.as_str() {
        return Err(AppError::InvalidInput(format!(
            "season id {} is archived",
            season.id
        )));
    }
    Ok(())
}

fn ensure_not_reopened(
    kind: EntityKind,
    id: i64,
    stored: StoredStatus,
    requested: Option<StorableStatus>,
) -> Result<(), AppError> {
    let reopening = stored == StoredStatus::Completed
        && requested.is_some_and(|status| status != StorableStatus::Completed);
    if reopening {
        return Err(AppError::InvalidInput(format!(
            "{kind} id {id} is completed; reopening it is not supported"
        )));
    }
    Ok(())
}

fn ensure_accepts_children(
    kind: EntityKind,
    id: i64,
    display: DisplayStatus,
) -> Result<(), AppError> {
    if !display.is_actionable() {
        return Err(AppError::InvalidInput(format!(
            "{kind} id {id} is locked and cannot take new entries yet"
        )));
    }
    Ok(())
}

fn ensure_accepts_progress(
    kind: EntityKind,
    id: i64,
    display: DisplayStatus,
) -> Result<(), AppError> {
    if !display.is_actionable() {
        return Err(AppError::InvalidInput(format!(
            "{kind} id {id} is locked; progress opens on its unlock date"
        )));
    }
    Ok(())
}
