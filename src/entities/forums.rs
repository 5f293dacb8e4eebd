use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "forums")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    #[sea_orm(unique)]
    pub permalink: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::moderatorships::Entity")]
    Moderatorships,
}

impl Related<super::moderatorships::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Moderatorships.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
