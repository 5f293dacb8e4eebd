use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, JoinType,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, SqlErr,
};

use super::user::InsertError;
use crate::domain::{Account, AccountId, ForumId, now_timestamp};
use crate::entities::{forums, moderatorships, prelude::*, users};

pub use crate::entities::forums::Model as Forum;

pub struct ForumRepository {
    conn: DatabaseConnection,
}

impl ForumRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        name: &str,
        permalink: &str,
        description: Option<String>,
    ) -> Result<Forum, InsertError> {
        let active = forums::ActiveModel {
            name: Set(name.to_string()),
            permalink: Set(permalink.to_string()),
            description: Set(description),
            created_at: Set(now_timestamp()),
            ..Default::default()
        };

        active.insert(&self.conn).await.map_err(InsertError::classify)
    }

    pub async fn list(&self) -> Result<Vec<Forum>> {
        Forums::find()
            .order_by_asc(forums::Column::Name)
            .all(&self.conn)
            .await
            .context("Failed to list forums")
    }

    pub async fn get_by_permalink(&self, permalink: &str) -> Result<Option<Forum>> {
        Forums::find()
            .filter(forums::Column::Permalink.eq(permalink))
            .one(&self.conn)
            .await
            .context("Failed to query forum by permalink")
    }

    pub async fn permalinks_like(&self, base: &str) -> Result<Vec<String>> {
        let rows: Vec<String> = Forums::find()
            .select_only()
            .column(forums::Column::Permalink)
            .filter(
                Condition::any()
                    .add(forums::Column::Permalink.eq(base))
                    .add(forums::Column::Permalink.like(format!("{base}-%"))),
            )
            .into_tuple()
            .all(&self.conn)
            .await
            .context("Failed to query forum permalinks")?;

        Ok(rows)
    }

    /// Returns `false` when the grant already existed.
    pub async fn grant_moderator(&self, account: AccountId, forum: ForumId) -> Result<bool> {
        let active = moderatorships::ActiveModel {
            user_id: Set(account.value()),
            forum_id: Set(forum.0),
            created_at: Set(now_timestamp()),
        };

        match Moderatorships::insert(active).exec(&self.conn).await {
            Ok(_) => Ok(true),
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Ok(false)
            }
            Err(err) => Err(err).context("Failed to grant moderatorship"),
        }
    }

    pub async fn revoke_moderator(&self, account: AccountId, forum: ForumId) -> Result<bool> {
        let result = Moderatorships::delete_many()
            .filter(moderatorships::Column::UserId.eq(account.value()))
            .filter(moderatorships::Column::ForumId.eq(forum.0))
            .exec(&self.conn)
            .await
            .context("Failed to revoke moderatorship")?;

        Ok(result.rows_affected > 0)
    }

    pub async fn is_moderator(&self, account: AccountId, forum: ForumId) -> Result<bool> {
        let count = Moderatorships::find()
            .filter(moderatorships::Column::UserId.eq(account.value()))
            .filter(moderatorships::Column::ForumId.eq(forum.0))
            .count(&self.conn)
            .await
            .context("Failed to check moderatorship")?;

        Ok(count > 0)
    }

    pub async fn moderators(&self, forum: ForumId) -> Result<Vec<Account>> {
        let rows = Users::find()
            .join(JoinType::InnerJoin, users::Relation::Moderatorships.def())
            .filter(moderatorships::Column::ForumId.eq(forum.0))
            .order_by_asc(users::Column::Login)
            .all(&self.conn)
            .await
            .context("Failed to list moderators")?;

        rows.into_iter().map(Account::try_from).collect()
    }
}
