use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::AuthUser,
    error::reject,
    profiles::{
        dto::{
            ProfileResponse, SetCalorieLimitRequest, SetMetricsRequest, SetTimezoneRequest,
            TimezonePageQuery,
        },
        repo_types::{MacroLimits, UserProfile},
    },
    state::AppState,
    timezones::{self, TimezonePage},
};

const MAX_PAGE_SIZE: usize = 50;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile))
        .route("/timezones", get(list_timezones))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/profile/timezone", put(put_timezone))
        .route("/profile/limits/calories", put(put_calorie_limit))
        .route("/profile/limits/macros", put(put_macro_limits))
        .route("/profile/metrics", put(put_metrics))
}

fn respond(state: &AppState, profile: UserProfile) -> Json<ProfileResponse> {
    let now = state.profiles.now_utc();
    Json(ProfileResponse {
        zone: timezones::zone_name(&profile.timezone_code),
        utc_offset: timezones::utc_offset_label(&profile.timezone_code, now),
        local_time: state.profiles.current_datetime(&profile),
        profile,
    })
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let profile = state.profiles.load(user_id).await.map_err(reject)?;
    Ok(respond(&state, profile))
}

#[instrument(skip(state))]
pub async fn put_timezone(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<SetTimezoneRequest>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let profile = state
        .profiles
        .set_timezone(user_id, &body.code)
        .await
        .map_err(reject)?;
    Ok(respond(&state, profile))
}

/// Non-positive limits leave the profile unchanged.
#[instrument(skip(state))]
pub async fn put_calorie_limit(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<SetCalorieLimitRequest>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let profile = state
        .profiles
        .set_calorie_limit(user_id, body.limit)
        .await
        .map_err(reject)?;
    Ok(respond(&state, profile))
}

#[instrument(skip(state))]
pub async fn put_macro_limits(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<MacroLimits>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let profile = state
        .profiles
        .set_macro_limits(user_id, body)
        .await
        .map_err(reject)?;
    Ok(respond(&state, profile))
}

#[instrument(skip(state))]
pub async fn put_metrics(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<SetMetricsRequest>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let profile = state
        .profiles
        .set_body_metrics(user_id, body.weight_kg, body.body_fat_percent)
        .await
        .map_err(reject)?;
    Ok(respond(&state, profile))
}

pub async fn list_timezones(Query(q): Query<TimezonePageQuery>) -> Json<TimezonePage> {
    Json(timezones::page(q.page, q.size.clamp(1, MAX_PAGE_SIZE)))
}
