//! Staff accounts repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::{
    error::{is_foreign_key_violation, is_unique_violation, AppError, AppResult},
    models::staff::{StaffChanges, StaffRole, StaffUser},
};

const STAFF_COLUMNS: &str = "id, login, password_hash, display_name, role, created_at, updated_at";

const LOGIN_CONSTRAINT: &str = "staff_users_login_key";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StaffRepository: Send + Sync {
    async fn get_by_id(&self, id: i32) -> AppResult<StaffUser>;

    /// `None` when no account has this (normalized) login
    async fn get_by_login(&self, login: &str) -> AppResult<Option<StaffUser>>;

    async fn list(&self) -> AppResult<Vec<StaffUser>>;

    /// Insert an account with an already hashed password
    async fn create(
        &self,
        login: &str,
        password_hash: &str,
        display_name: &str,
        role: StaffRole,
    ) -> AppResult<StaffUser>;

    /// Apply the set fields of `changes`
    async fn update(&self, id: i32, changes: &StaffChanges) -> AppResult<StaffUser>;

    /// Accounts referenced by the ledger cannot be removed
    async fn delete(&self, id: i32) -> AppResult<()>;

    async fn count(&self) -> AppResult<i64>;
}

#[derive(Clone)]
pub struct PgStaffRepository {
    pool: Pool<Postgres>,
}

impl PgStaffRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StaffRepository for PgStaffRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<StaffUser> {
        sqlx::query_as::<_, StaffUser>(&format!(
            "SELECT {} FROM staff_users WHERE id = $1",
            STAFF_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Staff user with id {} not found", id)))
    }

    async fn get_by_login(&self, login: &str) -> AppResult<Option<StaffUser>> {
        let user = sqlx::query_as::<_, StaffUser>(&format!(
            "SELECT {} FROM staff_users WHERE login = $1",
            STAFF_COLUMNS
        ))
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list(&self) -> AppResult<Vec<StaffUser>> {
        let users = sqlx::query_as::<_, StaffUser>(&format!(
            "SELECT {} FROM staff_users ORDER BY login",
            STAFF_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create(
        &self,
        login: &str,
        password_hash: &str,
        display_name: &str,
        role: StaffRole,
    ) -> AppResult<StaffUser> {
        sqlx::query_as::<_, StaffUser>(&format!(
            r#"
            INSERT INTO staff_users (login, password_hash, display_name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            STAFF_COLUMNS
        ))
        .bind(login)
        .bind(password_hash)
        .bind(display_name)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, LOGIN_CONSTRAINT) {
                AppError::Conflict(format!("Login '{}' is already taken", login))
            } else {
                AppError::Database(e)
            }
        })
    }

    async fn update(&self, id: i32, changes: &StaffChanges) -> AppResult<StaffUser> {
        sqlx::query_as::<_, StaffUser>(&format!(
            r#"
            UPDATE staff_users
            SET display_name = COALESCE($2, display_name),
                password_hash = COALESCE($3, password_hash),
                role = COALESCE($4, role),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            STAFF_COLUMNS
        ))
        .bind(id)
        .bind(&changes.display_name)
        .bind(&changes.password_hash)
        .bind(changes.role)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Staff user with id {} not found", id)))
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM staff_users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::Conflict(
                        "Staff user has recorded issues and cannot be deleted".to_string(),
                    )
                } else {
                    AppError::Database(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Staff user with id {} not found", id)));
        }

        Ok(())
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM staff_users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
