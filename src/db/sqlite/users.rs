use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::UserRepo,
    },
    models::{CreateUser, Session, User},
};

const USER_COLUMNS: &str = r#"
    id, email, name, deletion_scheduled_for, deletion_canceled_at, deletion_completed_at,
    created_at, updated_at
"#;

pub struct SqliteUserRepo {
    pool: SqlitePool,
}

impl SqliteUserRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_user(row: &SqliteRow) -> DbResult<User> {
        Ok(User {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            email: row.get("email"),
            name: row.get("name"),
            deletion_scheduled_for: row.get("deletion_scheduled_for"),
            deletion_canceled_at: row.get("deletion_canceled_at"),
            deletion_completed_at: row.get("deletion_completed_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl UserRepo for SqliteUserRepo {
    async fn create(&self, input: CreateUser) -> DbResult<User> {
        let id = Uuid::new_v4();
        let now = Utc::now().trunc_subsecs(3);

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&input.email)
        .bind(&input.name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DbError::Conflict(format!("User with email '{}' already exists", input.email))
            }
            _ => DbError::from(e),
        })?;

        Ok(User {
            id,
            email: input.email,
            name: input.name,
            deletion_scheduled_for: None,
            deletion_canceled_at: None,
            deletion_completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::parse_user).transpose()
    }

    async fn schedule_deletion(&self, id: Uuid, deadline: DateTime<Utc>) -> DbResult<User> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET deletion_scheduled_for = ?, deletion_canceled_at = NULL, updated_at = ?
            WHERE id = ? AND deletion_completed_at IS NULL
            "#,
        )
        .bind(deadline)
        .bind(Utc::now().trunc_subsecs(3))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    async fn cancel_deletion(&self, id: Uuid, canceled_at: DateTime<Utc>) -> DbResult<User> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET deletion_canceled_at = ?, updated_at = ?
            WHERE id = ?
              AND deletion_scheduled_for IS NOT NULL
              AND deletion_canceled_at IS NULL
              AND deletion_completed_at IS NULL
            "#,
        )
        .bind(canceled_at)
        .bind(canceled_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    async fn count_due_for_deletion(&self, now: DateTime<Utc>) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users
            WHERE deletion_scheduled_for IS NOT NULL
              AND deletion_scheduled_for <= ?
              AND deletion_canceled_at IS NULL
              AND deletion_completed_at IS NULL
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn list_due_for_deletion(&self, now: DateTime<Utc>, limit: i64) -> DbResult<Vec<User>> {
        let query = format!(
            r#"
            SELECT {} FROM users
            WHERE deletion_scheduled_for IS NOT NULL
              AND deletion_scheduled_for <= ?
              AND deletion_canceled_at IS NULL
              AND deletion_completed_at IS NULL
            ORDER BY deletion_scheduled_for ASC, id ASC
            LIMIT ?
            "#,
            USER_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::parse_user).collect()
    }

    async fn hard_delete(&self, id: Uuid) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        active_tenant_id: Option<Uuid>,
    ) -> DbResult<Session> {
        let id = Uuid::new_v4();
        let now = Utc::now().trunc_subsecs(3);

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, active_tenant_id, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(active_tenant_id.map(|t| t.to_string()))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Session {
            id,
            user_id,
            active_tenant_id,
            created_at: now,
        })
    }

    async fn get_session(&self, id: Uuid) -> DbResult<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, user_id, active_tenant_id, created_at FROM sessions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Session {
                id: parse_uuid(&row.get::<String, _>("id"))?,
                user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
                active_tenant_id: row
                    .get::<Option<String>, _>("active_tenant_id")
                    .as_deref()
                    .map(parse_uuid)
                    .transpose()?,
                created_at: row.get("created_at"),
            })
        })
        .transpose()
    }
}
