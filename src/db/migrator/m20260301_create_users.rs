use crate::entities::prelude::*;
use crate::entities::users;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Bootstrap administrator; the password should be changed right after setup.
const BOOTSTRAP_LOGIN: &str = "admin";
const BOOTSTRAP_EMAIL: &str = "admin@example.com";
const BOOTSTRAP_PASSWORD: &str = "password";

fn hash_bootstrap_password() -> Result<String, DbErr> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(BOOTSTRAP_PASSWORD.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DbErr::Custom(format!("Failed to hash bootstrap password: {e}")))
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Users)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        let conn = manager.get_connection();

        // login uniqueness ignores case
        conn.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_login_lower ON users(lower(login))",
        )
        .await?;

        conn.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_users_created_at ON users(created_at)",
        )
        .await?;

        let now = crate::domain::now_timestamp();
        let password_hash = hash_bootstrap_password()?;

        let insert = sea_orm_migration::sea_query::Query::insert()
            .into_table(Users)
            .columns([
                users::Column::Login,
                users::Column::Email,
                users::Column::Permalink,
                users::Column::PasswordHash,
                users::Column::State,
                users::Column::Admin,
                users::Column::ActivatedAt,
                users::Column::Hits,
                users::Column::ForumPostsCount,
                users::Column::CreatedAt,
                users::Column::UpdatedAt,
            ])
            .values_panic([
                BOOTSTRAP_LOGIN.into(),
                BOOTSTRAP_EMAIL.into(),
                BOOTSTRAP_LOGIN.into(),
                password_hash.into(),
                "active".into(),
                true.into(),
                now.clone().into(),
                0.into(),
                0.into(),
                now.clone().into(),
                now.into(),
            ])
            .to_owned();

        manager.exec_stmt(insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}
