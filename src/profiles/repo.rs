use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::profiles::repo_types::UserProfile;

/// Persistence port for profiles. Every call is a single atomic statement.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find(&self, user_id: i64) -> anyhow::Result<Option<UserProfile>>;

    /// Creates the profile if absent and returns the stored row either way.
    async fn insert_default(&self, user_id: i64, timezone_code: &str)
        -> anyhow::Result<UserProfile>;

    async fn save(&self, profile: &UserProfile) -> anyhow::Result<UserProfile>;
}

#[derive(Clone)]
pub struct PgProfileRepository {
    db: PgPool,
}

impl PgProfileRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const PROFILE_COLUMNS: &str = "user_id, timezone_code, calorie_limit, protein_limit, fat_limit, \
     carbs_limit, fiber_limit, sugar_limit, sodium_limit, cholesterol_limit, weight_kg, \
     body_fat_percent, created_at, updated_at";

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn find(&self, user_id: i64) -> anyhow::Result<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("select profile")?;
        Ok(profile)
    }

    async fn insert_default(
        &self,
        user_id: i64,
        timezone_code: &str,
    ) -> anyhow::Result<UserProfile> {
        // The no-op update makes RETURNING yield the row on conflict too.
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            INSERT INTO users (user_id, timezone_code)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(timezone_code)
        .fetch_one(&self.db)
        .await
        .context("insert profile")?;
        Ok(profile)
    }

    async fn save(&self, p: &UserProfile) -> anyhow::Result<UserProfile> {
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            UPDATE users
               SET timezone_code = $2,
                   calorie_limit = $3,
                   protein_limit = $4,
                   fat_limit = $5,
                   carbs_limit = $6,
                   fiber_limit = $7,
                   sugar_limit = $8,
                   sodium_limit = $9,
                   cholesterol_limit = $10,
                   weight_kg = $11,
                   body_fat_percent = $12,
                   updated_at = now()
             WHERE user_id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(p.user_id)
        .bind(&p.timezone_code)
        .bind(p.calorie_limit)
        .bind(p.protein_limit)
        .bind(p.fat_limit)
        .bind(p.carbs_limit)
        .bind(p.fiber_limit)
        .bind(p.sugar_limit)
        .bind(p.sodium_limit)
        .bind(p.cholesterol_limit)
        .bind(p.weight_kg)
        .bind(p.body_fat_percent)
        .fetch_one(&self.db)
        .await
        .with_context(|| format!("update profile {}", p.user_id))?;
        Ok(profile)
    }
}
