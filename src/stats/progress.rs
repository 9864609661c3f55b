use std::fmt;

use serde::Serialize;

use super::services::{percentage_of, Nutrient};

pub const DEFAULT_WIDTH: usize = 10;

const EMPTY: &str = "⬜";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    OnTrack,
    NearLimit,
    OverLimit,
}

impl Band {
    pub fn of(percentage: f64) -> Self {
        if percentage >= 100.0 {
            Band::OverLimit
        } else if percentage >= 85.0 {
            Band::NearLimit
        } else {
            Band::OnTrack
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Band::OnTrack => "on track",
            Band::NearLimit => "near limit",
            Band::OverLimit => "over limit",
        }
    }
}

/// Text progress bar. Calories are colored by band; every other nutrient has
/// its own fill glyph. Banding is the same for all of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressBar {
    pub kind: Nutrient,
    pub percentage: f64,
    pub width: usize,
    pub filled: usize,
    pub band: Band,
}

impl ProgressBar {
    pub fn new(kind: Nutrient, percentage: f64, width: usize) -> Self {
        let p = if percentage.is_finite() { percentage.clamp(0.0, 100.0) } else { 0.0 };
        let filled = ((p / 100.0) * width as f64).floor() as usize;
        Self {
            kind,
            percentage: p,
            width,
            filled: filled.min(width),
            band: Band::of(p),
        }
    }

    /// Bar for `value` against `limit`, or the kind's fallback target when the
    /// limit is unset.
    pub fn for_nutrient(kind: Nutrient, value: f64, limit: Option<f64>) -> Self {
        let target = limit.filter(|l| *l > 0.0).or(kind.fallback_target());
        Self::new(kind, percentage_of(value, target), DEFAULT_WIDTH)
    }

    fn fill_glyph(&self) -> &'static str {
        match self.kind {
            Nutrient::Calories => match self.band {
                Band::OnTrack => "🟩",
                Band::NearLimit => "🟨",
                Band::OverLimit => "🟥",
            },
            Nutrient::Protein => "🟦",
            Nutrient::Fat => "🟨",
            Nutrient::Carbs => "🟧",
            Nutrient::Fiber => "🟩",
            Nutrient::Sugar => "🟪",
            Nutrient::Sodium => "⬛",
            Nutrient::Cholesterol => "🟫",
        }
    }
}

impl fmt::Display for ProgressBar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let glyph = self.fill_glyph();
        for _ in 0..self.filled {
            f.write_str(glyph)?;
        }
        for _ in self.filled..self.width {
            f.write_str(EMPTY)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod progress_tests {
    use super::*;

    #[test]
    fn bands() {
        assert_eq!(Band::of(0.0), Band::OnTrack);
        assert_eq!(Band::of(84.9), Band::OnTrack);
        assert_eq!(Band::of(85.0), Band::NearLimit);
        assert_eq!(Band::of(99.9), Band::NearLimit);
        assert_eq!(Band::of(100.0), Band::OverLimit);
    }

    #[test]
    fn anything_at_or_over_100_is_a_full_red_bar() {
        for p in [100.0, 100.1, 250.0, 10_000.0, f64::MAX] {
            let bar = ProgressBar::new(Nutrient::Calories, p, DEFAULT_WIDTH);
            assert_eq!(bar.filled, DEFAULT_WIDTH);
            assert_eq!(bar.band, Band::OverLimit);
            assert_eq!(bar.to_string(), "🟥".repeat(DEFAULT_WIDTH));
        }
    }

    #[test]
    fn fill_is_floored() {
        let bar = ProgressBar::new(Nutrient::Calories, 59.9, DEFAULT_WIDTH);
        assert_eq!(bar.filled, 5);
        assert_eq!(bar.to_string(), format!("{}{}", "🟩".repeat(5), EMPTY.repeat(5)));
        assert_eq!(ProgressBar::new(Nutrient::Calories, 90.0, 10).to_string().matches('🟨').count(), 9);
    }

    #[test]
    fn banding_is_uniform_across_kinds() {
        for kind in Nutrient::ALL {
            let bar = ProgressBar::new(kind, 87.0, DEFAULT_WIDTH);
            assert_eq!(bar.band, Band::NearLimit, "{kind:?}");
            assert_eq!(bar.filled, 8);
        }
    }

    #[test]
    fn missing_fiber_limit_uses_fallback_target() {
        let bar = ProgressBar::for_nutrient(Nutrient::Fiber, 10.0, None);
        assert_eq!(bar.percentage, 40.0);
        assert_eq!(bar.filled, 4);

        let zero_limit = ProgressBar::for_nutrient(Nutrient::Fiber, 10.0, Some(0.0));
        assert_eq!(zero_limit.percentage, 40.0);
    }

    #[test]
    fn calories_without_limit_render_empty() {
        let bar = ProgressBar::for_nutrient(Nutrient::Calories, 1500.0, None);
        assert_eq!(bar.filled, 0);
        assert_eq!(bar.band, Band::OnTrack);
    }

    #[test]
    fn negative_or_nan_input_renders_empty() {
        assert_eq!(ProgressBar::new(Nutrient::Fat, -5.0, 10).filled, 0);
        assert_eq!(ProgressBar::new(Nutrient::Fat, f64::NAN, 10).filled, 0);
    }
}
