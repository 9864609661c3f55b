pub mod openai;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

use crate::diary::repo_types::{Micros, NutrientFields};
use crate::error::DiaryError;

pub const UNKNOWN_DISH: &str = "Unknown dish";

/// Photo → nutrient estimate. `Ok(None)` means the model could not tell.
/// Transport failures and timeouts are logged by the implementation and come
/// back as `DiaryError::AnalysisFailure`.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, image: Bytes) -> Result<Option<NutrientEstimate>, DiaryError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientEstimate {
    #[serde(default = "unknown_dish", deserialize_with = "lenient_name")]
    pub food_name: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub calories: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub protein: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub fat: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub carbs: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub fiber: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub sugar: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub sodium: f64,
    #[serde(default, deserialize_with = "lenient_number")]
    pub cholesterol: f64,
}

impl NutrientEstimate {
    /// Negative or non-finite quantities become 0; a blank name becomes the
    /// placeholder.
    pub fn sanitize(mut self) -> Self {
        for v in [
            &mut self.calories,
            &mut self.protein,
            &mut self.fat,
            &mut self.carbs,
            &mut self.fiber,
            &mut self.sugar,
            &mut self.sodium,
            &mut self.cholesterol,
        ] {
            if !v.is_finite() || *v < 0.0 {
                *v = 0.0;
            }
        }
        let name = self.food_name.trim();
        self.food_name = if name.is_empty() {
            UNKNOWN_DISH.to_string()
        } else {
            name.to_string()
        };
        self
    }
}

impl From<NutrientEstimate> for NutrientFields {
    fn from(e: NutrientEstimate) -> Self {
        let e = e.sanitize();
        NutrientFields {
            food_name: e.food_name,
            calories: e.calories,
            protein_g: e.protein,
            fat_g: e.fat,
            carbs_g: e.carbs,
            micros: Micros {
                fiber_g: e.fiber,
                sugar_g: e.sugar,
                sodium_mg: e.sodium,
                cholesterol_mg: e.cholesterol,
            },
        }
    }
}

fn unknown_dish() -> String {
    UNKNOWN_DISH.to_string()
}

fn lenient_name<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let raw = Option::<String>::deserialize(d)?;
    Ok(raw
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(unknown_dish))
}

/// Accepts numbers, numeric strings (comma decimals too) and null.
fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let raw = serde_json::Value::deserialize(d)?;
    Ok(match raw {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Stand-in used when no vision credentials are configured.
pub struct UnconfiguredVision;

#[async_trait]
impl VisionAnalyzer for UnconfiguredVision {
    async fn analyze(&self, _image: Bytes) -> Result<Option<NutrientEstimate>, DiaryError> {
        tracing::debug!("vision analysis is not configured");
        Err(DiaryError::AnalysisFailure)
    }
}

#[cfg(test)]
mod estimate_tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_vision_reports_analysis_failure() {
        let out = UnconfiguredVision.analyze(Bytes::from_static(b"img")).await;
        assert!(matches!(out, Err(DiaryError::AnalysisFailure)));
    }

    #[test]
    fn missing_fields_default() {
        let e: NutrientEstimate = serde_json::from_str(r#"{"calories": 250}"#).unwrap();
        assert_eq!(e.food_name, UNKNOWN_DISH);
        assert_eq!(e.calories, 250.0);
        assert_eq!(e.fiber, 0.0);
    }

    #[test]
    fn tolerates_strings_and_nulls() {
        let e: NutrientEstimate = serde_json::from_str(
            r#"{"food_name": null, "calories": "312,5", "protein": null, "fat": "n/a", "carbs": 40}"#,
        )
        .unwrap();
        assert_eq!(e.food_name, UNKNOWN_DISH);
        assert_eq!(e.calories, 312.5);
        assert_eq!(e.protein, 0.0);
        assert_eq!(e.fat, 0.0);
        assert_eq!(e.carbs, 40.0);
    }

    #[test]
    fn conversion_sanitizes() {
        let e = NutrientEstimate {
            food_name: "  Pancakes ".into(),
            calories: -20.0,
            protein: f64::INFINITY,
            fat: 12.0,
            carbs: 50.0,
            fiber: 1.0,
            sugar: 9.0,
            sodium: -1.0,
            cholesterol: 30.0,
        };
        let fields = NutrientFields::from(e);
        assert_eq!(fields.food_name, "Pancakes");
        assert_eq!(fields.calories, 0.0);
        assert_eq!(fields.protein_g, 0.0);
        assert_eq!(fields.micros.sodium_mg, 0.0);
        assert_eq!(fields.micros.cholesterol_mg, 30.0);
        assert!(fields.validate().is_ok());
    }
}
