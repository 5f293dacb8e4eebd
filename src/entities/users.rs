use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub login: String,

    /// Stored lowercased
    #[sea_orm(unique)]
    pub email: String,

    #[sea_orm(unique)]
    pub permalink: String,

    /// Argon2id password hash
    pub password_hash: String,

    /// One of passive, pending, active, suspended, deleted
    pub state: String,

    pub admin: bool,

    pub activation_code: Option<String>,

    pub activation_sent_at: Option<String>,

    pub activated_at: Option<String>,

    pub password_reset_code: Option<String>,

    pub password_reset_expires_at: Option<String>,

    /// Address waiting for confirmation
    pub new_email: Option<String>,

    pub email_activation_code: Option<String>,

    pub remember_token: Option<String>,

    pub remember_token_expires_at: Option<String>,

    pub hits: i32,

    pub forum_posts_count: i32,

    pub last_seen_at: Option<String>,

    pub deleted_at: Option<String>,

    pub created_at: String,

    pub updated_at: String,
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
