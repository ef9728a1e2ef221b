use sqlx::PgPool;
use uuid::Uuid;

use berthcare_core::{Result, Role};

use crate::models::User;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub zone_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct UserRepo {
    pool: PgPool,
}

impl UserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, new: &NewUser) -> Result<User> {
        let result = sqlx::query_as::<_, User>(
            "INSERT INTO users (email, password_hash, first_name, last_name, role, phone, zone_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(new.role)
        .bind(&new.phone)
        .bind(new.zone_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            // Lost a race with a concurrent registration for the same email.
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some("users_email_active_unique") =>
            {
                Err(berthcare_core::ApiError::EmailExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Case-insensitive lookup among non-deleted rows. Returns inactive
    /// users too; the caller decides how deactivation surfaces.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                 SELECT 1 FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL
             )",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
