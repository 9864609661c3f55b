use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::diary::repo_types::{Micros, NewRecord, NutritionRecord};

/// Persistence port for diary entries. Each call is one atomic statement, so
/// an entry is either fully written or not at all.
#[async_trait]
pub trait DiaryRepository: Send + Sync {
    async fn insert(&self, record: NewRecord) -> anyhow::Result<NutritionRecord>;

    /// Entries of `owner_id` with `from <= recorded_at < to`, newest first.
    async fn list_between(
        &self,
        owner_id: i64,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> anyhow::Result<Vec<NutritionRecord>>;

    /// Deletes only if the entry belongs to `owner_id`.
    async fn delete_owned(&self, owner_id: i64, id: i64) -> anyhow::Result<bool>;

    async fn update_micros_owned(
        &self,
        owner_id: i64,
        id: i64,
        micros: Micros,
    ) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgDiaryRepository {
    db: PgPool,
}

impl PgDiaryRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DiaryRepository for PgDiaryRepository {
    async fn insert(&self, r: NewRecord) -> anyhow::Result<NutritionRecord> {
        let row = sqlx::query_as::<_, NutritionRecord>(
            r#"
            INSERT INTO food_entries (owner_id, food_name, calories, protein_g, fat_g, carbs_g,
                                      fiber_g, sugar_g, sodium_mg, cholesterol_mg, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, owner_id, food_name, calories, protein_g, fat_g, carbs_g,
                      fiber_g, sugar_g, sodium_mg, cholesterol_mg, recorded_at
            "#,
        )
        .bind(r.owner_id)
        .bind(&r.fields.food_name)
        .bind(r.fields.calories)
        .bind(r.fields.protein_g)
        .bind(r.fields.fat_g)
        .bind(r.fields.carbs_g)
        .bind(r.fields.micros.fiber_g)
        .bind(r.fields.micros.sugar_g)
        .bind(r.fields.micros.sodium_mg)
        .bind(r.fields.micros.cholesterol_mg)
        .bind(r.recorded_at)
        .fetch_one(&self.db)
        .await
        .context("insert food entry")?;
        Ok(row)
    }

    async fn list_between(
        &self,
        owner_id: i64,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> anyhow::Result<Vec<NutritionRecord>> {
        let rows = sqlx::query_as::<_, NutritionRecord>(
            r#"
            SELECT id, owner_id, food_name, calories, protein_g, fat_g, carbs_g,
                   fiber_g, sugar_g, sodium_mg, cholesterol_mg, recorded_at
              FROM food_entries
             WHERE owner_id = $1
               AND recorded_at >= $2
               AND recorded_at < $3
             ORDER BY recorded_at DESC, id DESC
            "#,
        )
        .bind(owner_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await
        .context("list food entries")?;
        Ok(rows)
    }

    async fn delete_owned(&self, owner_id: i64, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM food_entries WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.db)
            .await
            .context("delete food entry")?;
        Ok(res.rows_affected() == 1)
    }

    async fn update_micros_owned(
        &self,
        owner_id: i64,
        id: i64,
        m: Micros,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE food_entries
               SET fiber_g = $3, sugar_g = $4, sodium_mg = $5, cholesterol_mg = $6
             WHERE id = $1 AND owner_id = $2
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(m.fiber_g)
        .bind(m.sugar_g)
        .bind(m.sodium_mg)
        .bind(m.cholesterol_mg)
        .execute(&self.db)
        .await
        .context("update food entry micros")?;
        Ok(res.rows_affected() == 1)
    }
}
