use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::profiles::repo_types::UserProfile;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: UserProfile,
    pub zone: &'static str,
    pub utc_offset: String,
    #[serde(with = "time::serde::rfc3339")]
    pub local_time: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct SetTimezoneRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct SetCalorieLimitRequest {
    pub limit: i32,
}

#[derive(Debug, Deserialize)]
pub struct SetMetricsRequest {
    pub weight_kg: f64,
    pub body_fat_percent: f64,
}

#[derive(Debug, Deserialize)]
pub struct TimezonePageQuery {
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub size: usize,
}
fn default_page_size() -> usize { 6 }
