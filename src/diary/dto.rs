use serde::{Deserialize, Serialize};
use time::Date;

use crate::diary::repo_types::NutritionRecord;

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    /// Defaults to the owner's local today.
    #[serde(default, deserialize_with = "optional_date")]
    pub date: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    #[serde(with = "crate::dates::iso_date")]
    pub date: Date,
    pub entries: Vec<NutritionRecord>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub dates: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

fn optional_date<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<Date>, D::Error> {
    match Option::<String>::deserialize(d)? {
        Some(raw) if !raw.trim().is_empty() => crate::dates::parse_iso(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected a YYYY-MM-DD date")),
        _ => Ok(None),
    }
}
