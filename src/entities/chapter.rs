use sea_orm::entity::prelude::*;

use super::season;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "chapters")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub season_id: i64,
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

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {
    Season,
}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Self::Season => Entity::belongs_to(season::Entity)
                .from(Column::SeasonId)
                .to(season::Column::Id)
                .into(),
        }
    }
}

impl Related<season::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Season.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
