use std::sync::Arc;

use serde::Serialize;
use time::Date;
use tracing::instrument;

use crate::diary::repo_types::NutritionRecord;
use crate::diary::services::DiaryService;
use crate::error::DiaryError;
use crate::profiles::{services::ProfileService, NutrientLimits};

/// The eight tracked quantities, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    Calories,
    Protein,
    Fat,
    Carbs,
    Fiber,
    Sugar,
    Sodium,
    Cholesterol,
}

impl Nutrient {
    pub const ALL: [Nutrient; 8] = [
        Nutrient::Calories,
        Nutrient::Protein,
        Nutrient::Fat,
        Nutrient::Carbs,
        Nutrient::Fiber,
        Nutrient::Sugar,
        Nutrient::Sodium,
        Nutrient::Cholesterol,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Nutrient::Calories => "Calories",
            Nutrient::Protein => "Protein",
            Nutrient::Fat => "Fat",
            Nutrient::Carbs => "Carbs",
            Nutrient::Fiber => "Fiber",
            Nutrient::Sugar => "Sugar",
            Nutrient::Sodium => "Sodium",
            Nutrient::Cholesterol => "Cholesterol",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Nutrient::Calories => "kcal",
            Nutrient::Sodium | Nutrient::Cholesterol => "mg",
            _ => "g",
        }
    }

    /// Target used for bars when the profile has no limit. Display only,
    /// never stored.
    pub fn fallback_target(self) -> Option<f64> {
        match self {
            Nutrient::Calories => None,
            Nutrient::Protein => Some(75.0),
            Nutrient::Fat => Some(60.0),
            Nutrient::Carbs => Some(250.0),
            Nutrient::Fiber => Some(25.0),
            Nutrient::Sugar => Some(50.0),
            Nutrient::Sodium => Some(2300.0),
            Nutrient::Cholesterol => Some(300.0),
        }
    }
}

impl NutrientLimits {
    pub fn get(&self, n: Nutrient) -> Option<f64> {
        match n {
            Nutrient::Calories => self.calories.map(f64::from),
            Nutrient::Protein => self.protein,
            Nutrient::Fat => self.fat,
            Nutrient::Carbs => self.carbs,
            Nutrient::Fiber => self.fiber,
            Nutrient::Sugar => self.sugar,
            Nutrient::Sodium => self.sodium,
            Nutrient::Cholesterol => self.cholesterol,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NutrientTotals {
    pub calories: f64,
    pub protein: f64,
    pub fat: f64,
    pub carbs: f64,
    pub fiber: f64,
    pub sugar: f64,
    pub sodium: f64,
    pub cholesterol: f64,
}

impl NutrientTotals {
    pub fn get(&self, n: Nutrient) -> f64 {
        match n {
            Nutrient::Calories => self.calories,
            Nutrient::Protein => self.protein,
            Nutrient::Fat => self.fat,
            Nutrient::Carbs => self.carbs,
            Nutrient::Fiber => self.fiber,
            Nutrient::Sugar => self.sugar,
            Nutrient::Sodium => self.sodium,
            Nutrient::Cholesterol => self.cholesterol,
        }
    }

    fn map(f: impl Fn(Nutrient) -> f64) -> Self {
        Self {
            calories: f(Nutrient::Calories),
            protein: f(Nutrient::Protein),
            fat: f(Nutrient::Fat),
            carbs: f(Nutrient::Carbs),
            fiber: f(Nutrient::Fiber),
            sugar: f(Nutrient::Sugar),
            sodium: f(Nutrient::Sodium),
            cholesterol: f(Nutrient::Cholesterol),
        }
    }
}

fn record_value(r: &NutritionRecord, n: Nutrient) -> f64 {
    match n {
        Nutrient::Calories => r.calories,
        Nutrient::Protein => r.protein_g,
        Nutrient::Fat => r.fat_g,
        Nutrient::Carbs => r.carbs_g,
        Nutrient::Fiber => r.fiber_g,
        Nutrient::Sugar => r.sugar_g,
        Nutrient::Sodium => r.sodium_mg,
        Nutrient::Cholesterol => r.cholesterol_mg,
    }
}

/// Aggregate of one local day. Percentages are clamped at 100; the amount
/// over the calorie limit is carried separately.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    #[serde(with = "crate::dates::iso_date")]
    pub date: Date,
    pub entry_count: usize,
    pub totals: NutrientTotals,
    pub limits: NutrientLimits,
    pub percentages: NutrientTotals,
    pub calories_over_limit: Option<f64>,
    pub calories_remaining: Option<f64>,
}

impl DailyStats {
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn over_limit(&self, n: Nutrient) -> Option<f64> {
        over_limit(self.totals.get(n), self.limits.get(n))
    }
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn percentage_of(sum: f64, limit: Option<f64>) -> f64 {
    match limit {
        Some(l) if l > 0.0 => round1(sum / l * 100.0).min(100.0),
        _ => 0.0,
    }
}

/// `|limit - sum|` when the sum exceeds a positive limit.
pub fn over_limit(sum: f64, limit: Option<f64>) -> Option<f64> {
    match limit {
        Some(l) if l > 0.0 && sum > l => Some(round1((l - sum).abs())),
        _ => None,
    }
}

pub fn remaining(sum: f64, limit: Option<f64>) -> Option<f64> {
    match limit {
        Some(l) if l > 0.0 && sum <= l => Some(round1(l - sum)),
        _ => None,
    }
}

pub fn compute_daily_stats(
    date: Date,
    records: &[NutritionRecord],
    limits: NutrientLimits,
) -> DailyStats {
    let totals =
        NutrientTotals::map(|n| round1(records.iter().map(|r| record_value(r, n)).sum()));
    let percentages = NutrientTotals::map(|n| percentage_of(totals.get(n), limits.get(n)));
    DailyStats {
        date,
        entry_count: records.len(),
        totals,
        limits,
        percentages,
        calories_over_limit: over_limit(totals.calories, limits.get(Nutrient::Calories)),
        calories_remaining: remaining(totals.calories, limits.get(Nutrient::Calories)),
    }
}

pub struct StatsService {
    diary: Arc<DiaryService>,
    profiles: Arc<ProfileService>,
}

impl StatsService {
    pub fn new(diary: Arc<DiaryService>, profiles: Arc<ProfileService>) -> Self {
        Self { diary, profiles }
    }

    #[instrument(skip(self))]
    pub async fn stats_for_date(&self, owner_id: i64, date: Date) -> Result<DailyStats, DiaryError> {
        let profile = self.profiles.load(owner_id).await?;
        let records = self.diary.records_for_profile(&profile, date).await?;
        Ok(compute_daily_stats(date, &records, profile.limits()))
    }

    pub async fn today(&self, owner_id: i64) -> Result<DailyStats, DiaryError> {
        let date = self.profiles.today(owner_id).await?;
        self.stats_for_date(owner_id, date).await
    }
}

#[cfg(test)]
mod stats_tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::diary::repo_types::{Micros, NutrientFields};
    use crate::memory::MemoryStore;
    use crate::profiles::MacroLimits;
    use time::macros::{date, datetime};

    fn services() -> (Arc<ProfileService>, Arc<DiaryService>, StatsService) {
        let clock = Arc::new(FixedClock::new(datetime!(2024-03-01 09:00 UTC)));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let profiles = Arc::new(ProfileService::new(store.clone(), clock));
        let diary = Arc::new(DiaryService::new(store, profiles.clone()));
        let stats = StatsService::new(diary.clone(), profiles.clone());
        (profiles, diary, stats)
    }

    fn entry(kcal: f64, protein: f64, fat: f64, carbs: f64, fiber: f64) -> NutrientFields {
        NutrientFields {
            food_name: "Meal".into(),
            calories: kcal,
            protein_g: protein,
            fat_g: fat,
            carbs_g: carbs,
            micros: Micros {
                fiber_g: fiber,
                ..Default::default()
            },
        }
    }

    #[test]
    fn percentage_is_clamped_and_guarded() {
        assert_eq!(percentage_of(50.0, Some(200.0)), 25.0);
        assert_eq!(percentage_of(2400.0, Some(2310.0)), 100.0);
        assert_eq!(percentage_of(10.0, Some(0.0)), 0.0);
        assert_eq!(percentage_of(10.0, None), 0.0);
        assert_eq!(percentage_of(1.0, Some(3.0)), 33.3);
    }

    #[tokio::test]
    async fn empty_day_still_carries_limits() {
        let (profiles, _, stats) = services();
        profiles.set_calorie_limit(1, 2000).await.unwrap();
        let s = stats.stats_for_date(1, date!(2024-03-01)).await.unwrap();
        assert!(s.is_empty());
        assert_eq!(s.totals, NutrientTotals::default());
        assert_eq!(s.limits.calories, Some(2000));
        assert_eq!(s.calories_remaining, Some(2000.0));
        assert_eq!(s.calories_over_limit, None);
    }

    #[tokio::test]
    async fn over_limit_keeps_percentage_at_100_and_reports_magnitude() {
        let (profiles, diary, stats) = services();
        profiles
            .set_macro_limits(
                1,
                MacroLimits {
                    protein: 120.0,
                    fat: 70.0,
                    carbs: 300.0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        diary.append(1, entry(2400.0, 50.0, 50.0, 50.0, 0.0)).await.unwrap();

        let s = stats.today(1).await.unwrap();
        assert_eq!(s.limits.calories, Some(2310));
        assert_eq!(s.percentages.calories, 100.0);
        assert_eq!(s.calories_over_limit, Some(90.0));
        assert_eq!(s.calories_remaining, None);
        assert_eq!(s.over_limit(Nutrient::Calories), Some(90.0));
    }

    #[tokio::test]
    async fn totals_match_manual_sum() {
        let (_, diary, stats) = services();
        let entries = [
            entry(310.4, 12.2, 7.0, 40.1, 3.3),
            entry(95.0, 0.5, 0.3, 25.0, 4.4),
            entry(512.7, 30.0, 22.2, 48.0, 0.0),
        ];
        for e in entries.iter().cloned() {
            diary.append(1, e).await.unwrap();
        }
        let s = stats.stats_for_date(1, date!(2024-03-01)).await.unwrap();
        assert_eq!(s.entry_count, 3);
        let sum = |f: fn(&NutrientFields) -> f64| round1(entries.iter().map(f).sum());
        assert_eq!(s.totals.calories, sum(|e| e.calories));
        assert_eq!(s.totals.protein, sum(|e| e.protein_g));
        assert_eq!(s.totals.fat, sum(|e| e.fat_g));
        assert_eq!(s.totals.carbs, sum(|e| e.carbs_g));
        assert_eq!(s.totals.fiber, sum(|e| e.micros.fiber_g));
    }

    #[tokio::test]
    async fn other_users_entries_are_not_counted() {
        let (_, diary, stats) = services();
        diary.append(1, entry(100.0, 1.0, 1.0, 1.0, 0.0)).await.unwrap();
        diary.append(2, entry(900.0, 1.0, 1.0, 1.0, 0.0)).await.unwrap();
        let s = stats.stats_for_date(1, date!(2024-03-01)).await.unwrap();
        assert_eq!(s.entry_count, 1);
        assert_eq!(s.totals.calories, 100.0);
    }
}
