use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use time_tz::{OffsetDateTimeExt, Tz};

use crate::error::DiaryError;

/// One confirmed food intake. Only the micro fields may change after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct NutritionRecord {
    pub id: i64,
    pub owner_id: i64,
    pub food_name: String,
    pub calories: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
    pub fiber_g: f64,
    pub sugar_g: f64,
    pub sodium_mg: f64,
    pub cholesterol_mg: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl NutritionRecord {
    /// Calendar date of the record as seen in `zone`.
    pub fn local_date(&self, zone: &Tz) -> Date {
        self.recorded_at.to_timezone(zone).date()
    }

    pub fn micros(&self) -> Micros {
        Micros {
            fiber_g: self.fiber_g,
            sugar_g: self.sugar_g,
            sodium_mg: self.sodium_mg,
            cholesterol_mg: self.cholesterol_mg,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Micros {
    #[serde(default)]
    pub fiber_g: f64,
    #[serde(default)]
    pub sugar_g: f64,
    #[serde(default)]
    pub sodium_mg: f64,
    #[serde(default)]
    pub cholesterol_mg: f64,
}

impl Micros {
    pub fn validate(&self) -> Result<(), DiaryError> {
        non_negative("fiber", self.fiber_g)?;
        non_negative("sugar", self.sugar_g)?;
        non_negative("sodium", self.sodium_mg)?;
        non_negative("cholesterol", self.cholesterol_mg)
    }
}

/// Nutrient quantities of an entry about to be recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutrientFields {
    pub food_name: String,
    pub calories: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
    #[serde(default)]
    pub micros: Micros,
}

impl NutrientFields {
    pub fn validate(&self) -> Result<(), DiaryError> {
        if self.food_name.trim().is_empty() {
            return Err(DiaryError::validation("food name must not be empty"));
        }
        non_negative("calories", self.calories)?;
        non_negative("protein", self.protein_g)?;
        non_negative("fat", self.fat_g)?;
        non_negative("carbs", self.carbs_g)?;
        self.micros.validate()
    }
}

/// Row handed to the repository; `recorded_at` is already stamped.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub owner_id: i64,
    pub fields: NutrientFields,
    pub recorded_at: OffsetDateTime,
}

fn non_negative(name: &str, value: f64) -> Result<(), DiaryError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DiaryError::validation(format!("{name} must be zero or more")))
    }
}
