use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use time_tz::Tz;

use crate::error::DiaryError;
use crate::timezones::{self, DEFAULT_TIMEZONE_CODE};

/// Per-user configuration. Limits are optional; grams except sodium and
/// cholesterol, which are milligrams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub user_id: i64,
    pub timezone_code: String,
    pub calorie_limit: Option<i32>,
    pub protein_limit: Option<f64>,
    pub fat_limit: Option<f64>,
    pub carbs_limit: Option<f64>,
    pub fiber_limit: Option<f64>,
    pub sugar_limit: Option<f64>,
    pub sodium_limit: Option<f64>,
    pub cholesterol_limit: Option<f64>,
    pub weight_kg: Option<f64>,
    pub body_fat_percent: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Snapshot of the configured daily ceilings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NutrientLimits {
    pub calories: Option<i32>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carbs: Option<f64>,
    pub fiber: Option<f64>,
    pub sugar: Option<f64>,
    pub sodium: Option<f64>,
    pub cholesterol: Option<f64>,
}

/// Input of the macro-limit operation. Micro limits left as `None` keep their
/// current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct MacroLimits {
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    #[serde(default)]
    pub fiber: Option<f64>,
    #[serde(default)]
    pub sugar: Option<f64>,
    #[serde(default)]
    pub sodium: Option<f64>,
    #[serde(default)]
    pub cholesterol: Option<f64>,
}

impl MacroLimits {
    /// Linear heuristic from body weight and body-fat percentage. Not a
    /// clinical formula.
    pub fn from_body_metrics(weight_kg: f64, body_fat_percent: f64) -> Self {
        let lean_mass = weight_kg * (1.0 - body_fat_percent / 100.0);
        Self {
            protein: 2.0 * lean_mass,
            fat: weight_kg,
            carbs: 3.0 * weight_kg,
            fiber: Some(0.3 * weight_kg),
            sugar: Some(0.5 * weight_kg),
            sodium: Some(20.0 * weight_kg),
            cholesterol: Some(3.0 * weight_kg),
        }
    }

    pub fn calories(&self) -> i32 {
        (self.protein * 4.0 + self.fat * 9.0 + self.carbs * 4.0).round() as i32
    }

    fn validate(&self) -> Result<(), DiaryError> {
        for (name, value) in [
            ("protein", self.protein),
            ("fat", self.fat),
            ("carbs", self.carbs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DiaryError::validation(format!(
                    "{name} limit must be a positive number"
                )));
            }
        }
        for (name, value) in [
            ("fiber", self.fiber),
            ("sugar", self.sugar),
            ("sodium", self.sodium),
            ("cholesterol", self.cholesterol),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(DiaryError::validation(format!(
                        "{name} limit must be a positive number"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl UserProfile {
    pub fn new_default(user_id: i64, now: OffsetDateTime) -> Self {
        Self {
            user_id,
            timezone_code: DEFAULT_TIMEZONE_CODE.to_string(),
            calorie_limit: None,
            protein_limit: None,
            fat_limit: None,
            carbs_limit: None,
            fiber_limit: None,
            sugar_limit: None,
            sodium_limit: None,
            cholesterol_limit: None,
            weight_kg: None,
            body_fat_percent: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn zone(&self) -> &'static Tz {
        timezones::resolve(&self.timezone_code)
    }

    pub fn current_datetime(&self, now_utc: OffsetDateTime) -> OffsetDateTime {
        timezones::now_in(&self.timezone_code, now_utc)
    }

    pub fn current_date(&self, now_utc: OffsetDateTime) -> Date {
        self.current_datetime(now_utc).date()
    }

    pub fn limits(&self) -> NutrientLimits {
        NutrientLimits {
            calories: self.calorie_limit,
            protein: self.protein_limit,
            fat: self.fat_limit,
            carbs: self.carbs_limit,
            fiber: self.fiber_limit,
            sugar: self.sugar_limit,
            sodium: self.sodium_limit,
            cholesterol: self.cholesterol_limit,
        }
    }

    /// Macro limits are authoritative: the calorie limit is recomputed from
    /// them and any manual value is replaced.
    pub fn apply_macro_limits(&mut self, limits: MacroLimits) -> Result<(), DiaryError> {
        limits.validate()?;
        self.protein_limit = Some(limits.protein);
        self.fat_limit = Some(limits.fat);
        self.carbs_limit = Some(limits.carbs);
        if limits.fiber.is_some() {
            self.fiber_limit = limits.fiber;
        }
        if limits.sugar.is_some() {
            self.sugar_limit = limits.sugar;
        }
        if limits.sodium.is_some() {
            self.sodium_limit = limits.sodium;
        }
        if limits.cholesterol.is_some() {
            self.cholesterol_limit = limits.cholesterol;
        }
        self.calorie_limit = Some(limits.calories());
        Ok(())
    }

    pub fn apply_body_metrics(
        &mut self,
        weight_kg: f64,
        body_fat_percent: f64,
    ) -> Result<(), DiaryError> {
        if !weight_kg.is_finite() || weight_kg <= 0.0 {
            return Err(DiaryError::validation("weight must be a positive number"));
        }
        if !body_fat_percent.is_finite() || !(0.0..=100.0).contains(&body_fat_percent) {
            return Err(DiaryError::validation(
                "body fat percentage must be between 0 and 100",
            ));
        }
        self.apply_macro_limits(MacroLimits::from_body_metrics(weight_kg, body_fat_percent))?;
        self.weight_kg = Some(weight_kg);
        self.body_fat_percent = Some(body_fat_percent);
        Ok(())
    }
}
