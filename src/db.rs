use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Schema, Statement};
use url::Url;

use crate::entities::{chapter, quest, season, task};
use crate::error::AppError;

pub fn resolve_db_path(home: &Path) -> PathBuf {
    home.join("questline.db")
}

pub fn ensure_parent_dir(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn open_lock(path: &Path) -> Result<fd_lock::RwLock<File>, AppError> {
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)?;
    Ok(fd_lock::RwLock::new(file))
}

pub async fn connect(path: &Path) -> Result<DatabaseConnection, AppError> {
    let mut url = Url::from_file_path(path)
        .map_err(|_| AppError::InvalidInput(format!("invalid sqlite path: {}", path.display())))?;
    url.set_query(Some("mode=rwc"));
    let sqlite_url = url.as_str().replacen("file://", "sqlite://", 1);
    Ok(Database::connect(&sqlite_url).await?)
}

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), AppError> {
    db.execute(Statement::from_string(
        DatabaseBackend::Sqlite,
        "PRAGMA foreign_keys = ON;",
    ))
    .await?;

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut season_stmt = schema.create_table_from_entity(season::Entity);
    season_stmt.if_not_exists();
    db.execute(builder.build(&season_stmt)).await?;

    let mut chapter_stmt = schema.create_table_from_entity(chapter::Entity);
    chapter_stmt.if_not_exists();
    db.execute(builder.build(&chapter_stmt)).await?;

    let mut quest_stmt = schema.create_table_from_entity(quest::Entity);
    quest_stmt.if_not_exists();
    db.execute(builder.build(&quest_stmt)).await?;

    let mut task_stmt = schema.create_table_from_entity(task::Entity);
    task_stmt.if_not_exists();
    db.execute(builder.build(&task_stmt)).await?;

    let mut chapter_index = Index::create()
        .name("idx_chapters_season")
        .table(chapter::Entity)
        .col(chapter::Column::SeasonId)
        .to_owned();
    chapter_index.if_not_exists();
    db.execute(builder.build(&chapter_index)).await?;

    let mut quest_season_index = Index::create()
        .name("idx_quests_season")
        .table(quest::Entity)
        .col(quest::Column::SeasonId)
        .to_owned();
    quest_season_index.if_not_exists();
    db.execute(builder.build(&quest_season_index)).await?;

    let mut quest_chapter_index = Index::create()
        .name("idx_quests_chapter")
        .table(quest::Entity)
        .col(quest::Column::ChapterId)
        .to_owned();
    quest_chapter_index.if_not_exists();
    db.execute(builder.build(&quest_chapter_index)).await?;

    let mut task_index = Index::create()
        .name("idx_tasks_quest")
        .table(task::Entity)
        .col(task::Column::QuestId)
        .to_owned();
    task_index.if_not_exists();
    db.execute(builder.build(&task_index)).await?;

    Ok(())
}
