use sea_orm::entity::prelude::*;

// Season and chapter links are plain ids: a quest may outlive the chapter it
// pointed at, and readers tolerate the dangling reference.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "quests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub season_id: Option<i64>,
    pub chapter_id: Option<i64>,
    pub title: String,
    pub status: String,
    pub unlock_time: Option<String>,
    pub deadline: Option<String>,
    pub completed_at: Option<String>,
    pub progress: i32,
    pub pause_reason: Option<String>,
    pub paused_at: Option<String>,
    pub pause_progress: Option<i32>,
    pub review: Option<String>,
    pub review_satisfaction: Option<i32>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
