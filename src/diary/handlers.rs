use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch},
    Json, Router,
};
use tracing::{info, instrument};

use crate::{
    auth::AuthUser,
    diary::{
        dto::{DateQuery, DeletedResponse, EntriesResponse, HistoryQuery, HistoryResponse},
        repo_types::Micros,
    },
    error::{reject, DiaryError},
    stats::DailyStats,
    state::AppState,
};

const MAX_HISTORY_DAYS: usize = 90;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/diary/stats", get(get_stats))
        .route("/diary/entries", get(list_entries))
        .route("/diary/history", get(get_history))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/diary/entries/:id", delete(delete_entry))
        .route("/diary/days/:date/entries/:index", delete(delete_entry_at))
        .route("/diary/entries/:id/micros", patch(patch_micros))
}

async fn resolve_date(state: &AppState, user_id: i64, q: DateQuery) -> Result<time::Date, DiaryError> {
    match q.date {
        Some(d) => Ok(d),
        None => state.profiles.today(user_id).await,
    }
}

#[instrument(skip(state))]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DateQuery>,
) -> Result<Json<DailyStats>, (StatusCode, String)> {
    let date = resolve_date(&state, user_id, q).await.map_err(reject)?;
    let stats = state
        .stats
        .stats_for_date(user_id, date)
        .await
        .map_err(reject)?;
    Ok(Json(stats))
}

#[instrument(skip(state))]
pub async fn list_entries(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DateQuery>,
) -> Result<Json<EntriesResponse>, (StatusCode, String)> {
    let date = resolve_date(&state, user_id, q).await.map_err(reject)?;
    let entries = state
        .diary
        .records_on_date(user_id, date)
        .await
        .map_err(reject)?;
    Ok(Json(EntriesResponse { date, entries }))
}

#[instrument(skip(state))]
pub async fn get_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let days = q
        .days
        .unwrap_or(state.config.history_days)
        .clamp(1, MAX_HISTORY_DAYS);
    let dates = state
        .diary
        .last_n_dates(user_id, days)
        .await
        .map_err(reject)?;
    Ok(Json(HistoryResponse {
        dates: dates.into_iter().map(crate::dates::iso).collect(),
    }))
}

#[instrument(skip(state))]
pub async fn delete_entry(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<DeletedResponse>, (StatusCode, String)> {
    let deleted = state.diary.delete_by_id(user_id, id).await.map_err(reject)?;
    if !deleted {
        return Err(reject(DiaryError::NotFound));
    }
    Ok(Json(DeletedResponse { deleted }))
}

#[instrument(skip(state))]
pub async fn delete_entry_at(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((date, index)): Path<(String, usize)>,
) -> Result<Json<DeletedResponse>, (StatusCode, String)> {
    let date = crate::dates::parse_iso(&date)
        .ok_or_else(|| reject(DiaryError::validation("date must be YYYY-MM-DD")))?;
    let deleted = state
        .diary
        .delete_by_display_index(user_id, date, index)
        .await
        .map_err(reject)?;
    if !deleted {
        return Err(reject(DiaryError::NotFound));
    }
    Ok(Json(DeletedResponse { deleted }))
}

#[instrument(skip(state, micros))]
pub async fn patch_micros(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(micros): Json<Micros>,
) -> Result<StatusCode, (StatusCode, String)> {
    let updated = state
        .diary
        .backfill_micros(user_id, id, micros)
        .await
        .map_err(reject)?;
    if !updated {
        return Err(reject(DiaryError::NotFound));
    }
    info!(user_id, id, "micros backfilled");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod diary_handler_tests {
    use super::*;
    use crate::diary::repo_types::{NutrientFields, NutritionRecord};

    async fn seeded(state: &AppState, user_id: i64) -> NutritionRecord {
        state
            .diary
            .append(
                user_id,
                NutrientFields {
                    food_name: "Omelette".into(),
                    calories: 320.0,
                    protein_g: 21.0,
                    fat_g: 24.0,
                    carbs_g: 2.0,
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn stats_and_entries_default_to_today() {
        let state = AppState::fake();
        let rec = seeded(&state, 1).await;

        let Json(stats) = get_stats(State(state.clone()), AuthUser(1), Query(DateQuery { date: None }))
            .await
            .unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.totals.calories, 320.0);

        let Json(list) = list_entries(State(state), AuthUser(1), Query(DateQuery { date: None }))
            .await
            .unwrap();
        assert_eq!(list.entries.len(), 1);
        assert_eq!(list.entries[0].id, rec.id);
        assert_eq!(list.date, stats.date);
    }

    #[tokio::test]
    async fn foreign_delete_is_not_found() {
        let state = AppState::fake();
        let rec = seeded(&state, 1).await;
        let err = delete_entry(State(state.clone()), AuthUser(2), Path(rec.id))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        let Json(ok) = delete_entry(State(state), AuthUser(1), Path(rec.id))
            .await
            .unwrap();
        assert!(ok.deleted);
    }

    #[tokio::test]
    async fn delete_by_index_validates_date() {
        let state = AppState::fake();
        let err = delete_entry_at(State(state), AuthUser(1), Path(("yesterday".into(), 0)))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn micros_backfill() {
        let state = AppState::fake();
        let rec = seeded(&state, 1).await;
        let micros = Micros {
            fiber_g: 0.0,
            sugar_g: 1.0,
            sodium_mg: 350.0,
            cholesterol_mg: 370.0,
        };
        let status = patch_micros(State(state.clone()), AuthUser(1), Path(rec.id), Json(micros))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let bad = Micros {
            sodium_mg: -1.0,
            ..micros
        };
        let err = patch_micros(State(state), AuthUser(1), Path(rec.id), Json(bad))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_respects_requested_days() {
        let state = AppState::fake();
        let Json(h) = get_history(State(state), AuthUser(1), Query(HistoryQuery { days: Some(3) }))
            .await
            .unwrap();
        assert_eq!(h.dates.len(), 3);
        assert!(h.dates[0] > h.dates[2]);
    }
}
