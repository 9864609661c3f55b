use std::fmt::Write as _;

use time::{Date, OffsetDateTime};
use time_tz::OffsetDateTimeExt;

use super::events::{Action, Choice, Keyboard, Reply};
use super::state::MacroField;
use crate::dates;
use crate::diary::repo_types::{NutrientFields, NutritionRecord};
use crate::profiles::UserProfile;
use crate::stats::{DailyStats, Nutrient, ProgressBar};
use crate::timezones::{self, TimezonePage};

pub const TIMEZONE_PAGE_SIZE: usize = 6;

pub fn welcome() -> Reply {
    Reply::text(
        "👋 Welcome!\n\n\
         I count calories from food photos. Here is what I can do:\n\
         • analyze a photo of your meal 📸\n\
         • keep a daily food diary 📊\n\
         • track protein, fat, carbs and micronutrients 📝\n\
         • warn you when you go over your limits ⚙️\n\n\
         Send a photo of your food to get started!",
    )
    .keyboard(Keyboard::Main)
}

pub fn help() -> Reply {
    Reply::text(
        "🔍 How to use me:\n\n\
         1️⃣ Send a photo of your food and I will estimate its nutrients\n\
         2️⃣ Confirm the estimate and I will add it to your diary\n\
         3️⃣ Check today's stats or browse previous days\n\
         4️⃣ Set your limits and I will tell you how much is left\n\n\
         Commands:\n\
         /start - start over\n\
         /help - show this help\n\
         /today - today's stats\n\
         /history - previous days\n\
         /setlimit - set the daily calorie limit\n\
         /macros - set protein, fat, carb and micronutrient limits\n\
         /metrics - derive limits from weight and body fat\n\
         /timezone - choose your timezone\n\
         /cancel - cancel the current action",
    )
}

pub fn cancelled() -> Reply {
    Reply::text("❌ Cancelled. What would you like to do next?").keyboard(Keyboard::Main)
}

pub fn idle_hint() -> Reply {
    Reply::text("Send me a photo of your food, or pick an option from the menu.")
        .keyboard(Keyboard::Main)
}

pub fn ask_photo() -> Reply {
    Reply::text("📸 Please send a photo of your meal and I will analyze it.")
        .keyboard(Keyboard::Cancel)
}

pub fn still_analyzing() -> Reply {
    Reply::text("🔍 Still analyzing your photo, please wait a moment.")
}

pub fn analysis_failed() -> Reply {
    Reply::text("😔 I couldn't recognize any food in that photo. Please try a clearer shot.")
        .keyboard(Keyboard::Main)
}

pub fn analysis_error() -> Reply {
    Reply::text("😔 Something went wrong while analyzing the photo. Please send it again.")
        .keyboard(Keyboard::Main)
}

pub fn storage_failure() -> Reply {
    Reply::text("⚠️ Something went wrong on our side. Please try again in a moment.")
        .keyboard(Keyboard::Main)
}

pub fn nothing_to_confirm() -> Reply {
    Reply::text("There is nothing to confirm right now. Send a new photo to log a meal.")
}

pub fn nothing_to_skip() -> Reply {
    Reply::text("There is nothing to skip right now.")
}

pub fn unknown_button() -> Reply {
    Reply::text("That button has expired. Please use the menu.").keyboard(Keyboard::Main)
}

fn confirm_choices() -> Vec<Vec<Choice>> {
    vec![vec![
        Choice::new("✅ Confirm", Action::Confirm),
        Choice::new("❌ Cancel", Action::Cancel),
    ]]
}

pub fn analysis(fields: &NutrientFields) -> Reply {
    let m = &fields.micros;
    Reply::text(format!(
        "🍽 {}\n\n\
         📊 Nutrition facts:\n\
         🔥 Calories: {} kcal\n\
         🥩 Protein: {} g\n\
         🧈 Fat: {} g\n\
         🍚 Carbs: {} g\n\
         🌾 Fiber: {} g\n\
         🍬 Sugar: {} g\n\
         🧂 Sodium: {} mg\n\
         🥚 Cholesterol: {} mg\n\n\
         Is this right? Press \"Confirm\" to save it to your diary.",
        fields.food_name,
        num(fields.calories),
        num(fields.protein_g),
        num(fields.fat_g),
        num(fields.carbs_g),
        num(m.fiber_g),
        num(m.sugar_g),
        num(m.sodium_mg),
        num(m.cholesterol_mg),
    ))
    .choices(confirm_choices())
}

pub fn confirm_or_cancel(fields: &NutrientFields) -> Reply {
    Reply::text(format!(
        "Please confirm or cancel \"{}\" first.",
        fields.food_name
    ))
    .choices(confirm_choices())
}

pub fn recorded(record: &NutritionRecord, stats: &DailyStats) -> Reply {
    let mut text = format!("✅ \"{}\" added to your diary!\n\n", record.food_name);
    text.push_str(&stats_body("📊 Today", stats));
    Reply::text(text).keyboard(Keyboard::Main)
}

pub fn recorded_without_stats(record: &NutritionRecord) -> Reply {
    Reply::text(format!(
        "✅ \"{}\" added to your diary!\n\nToday's stats are unavailable right now.",
        record.food_name
    ))
    .keyboard(Keyboard::Main)
}

/// Stats summary with progress bars. An empty day still shows the limits.
pub fn stats(heading: &str, stats: &DailyStats) -> Reply {
    Reply::text(stats_body(heading, stats))
}

fn stats_body(heading: &str, s: &DailyStats) -> String {
    let mut out = format!("{heading} ({})\n\n", dates::display(s.date));
    if s.is_empty() {
        out.push_str("No entries yet. Send a photo of your food to start tracking.\n\n");
    } else {
        let _ = writeln!(out, "Meals: {}", s.entry_count);
    }

    let kcal = s.totals.calories;
    match s.limits.calories {
        Some(limit) => {
            let _ = writeln!(out, "Calorie limit: {limit} kcal");
            let _ = writeln!(out, "Eaten: {} kcal ({}%)", num(kcal), num(s.percentages.calories));
            if let Some(over) = s.calories_over_limit {
                let _ = writeln!(out, "⚠️ Over the limit by {} kcal", num(over));
            } else if let Some(left) = s.calories_remaining {
                let _ = writeln!(out, "Left: {} kcal", num(left));
            }
        }
        None => {
            let _ = writeln!(out, "Eaten: {} kcal", num(kcal));
        }
    }
    let bar = ProgressBar::for_nutrient(Nutrient::Calories, kcal, s.limits.get(Nutrient::Calories));
    let _ = writeln!(out, "{bar} {}", bar.band.label());
    out.push('\n');

    for n in &Nutrient::ALL[1..] {
        let value = s.totals.get(*n);
        let limit = s.limits.get(*n);
        let bar = ProgressBar::for_nutrient(*n, value, limit);
        let target = limit
            .filter(|l| *l > 0.0)
            .or(n.fallback_target())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{}: {} / {} {}\n{bar}",
            n.label(),
            num(value),
            num(target),
            n.unit()
        );
    }
    out.trim_end().to_string()
}

/// One day: stats, the entries newest first, and a delete button per entry.
pub fn day_view(stats: &DailyStats, records: &[NutritionRecord], zone_code: &str) -> Reply {
    let mut text = stats_body("📅 Diary", stats);
    if !records.is_empty() {
        text.push_str("\n\nEntries:\n");
        let zone = timezones::resolve(zone_code);
        for (i, r) in records.iter().enumerate() {
            let local = r.recorded_at.to_timezone(zone);
            let _ = writeln!(
                text,
                "{}. {} {} - {} kcal",
                i + 1,
                dates::clock_time(local),
                r.food_name,
                num(r.calories)
            );
        }
    }
    let mut rows: Vec<Vec<Choice>> = records
        .iter()
        .enumerate()
        .map(|(index, r)| {
            vec![Choice::new(
                format!("🗑 {}. {}", index + 1, r.food_name),
                Action::Delete {
                    date: stats.date,
                    index,
                },
            )]
        })
        .collect();
    rows.push(vec![Choice::new("📅 Back to history", Action::History)]);
    Reply::text(text.trim_end().to_string()).choices(rows)
}

pub fn entry_deleted() -> Reply {
    Reply::text("🗑 Entry deleted.")
}

pub fn entry_not_found() -> Reply {
    Reply::text("That entry no longer exists. It may have been deleted already.")
}

pub fn history(dates_newest_first: &[Date]) -> Reply {
    let rows = dates_newest_first
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|d| Choice::new(dates::display(*d), Action::Day(*d)))
                .collect()
        })
        .collect();
    Reply::text("📅 Pick a day to view:").choices(rows)
}

pub fn ask_calorie_limit(current: Option<i32>) -> Reply {
    let current = current.map_or_else(|| "not set".to_string(), |l| format!("{l} kcal"));
    Reply::text(format!(
        "⚙️ Daily calorie limit\n\nCurrent limit: {current}\n\nEnter a new daily limit (a whole number):"
    ))
    .keyboard(Keyboard::Cancel)
}

pub fn invalid_calorie_limit() -> Reply {
    Reply::text("❌ Please enter a valid calorie limit (a positive whole number).")
        .keyboard(Keyboard::Cancel)
}

pub fn calorie_limit_set(limit: i32) -> Reply {
    Reply::text(format!("✅ Your daily calorie limit is now {limit} kcal.")).keyboard(Keyboard::Main)
}

pub fn ask_macro(which: MacroField) -> Reply {
    let n = which.nutrient();
    let reply = if which.is_optional() {
        Reply::text(format!(
            "Enter your daily {} limit in {}, or press \"Skip\" (or send \"-\") to keep the current value:",
            n.label().to_lowercase(),
            n.unit()
        ))
        .choices(vec![vec![Choice::new("⏭ Skip", Action::Skip)]])
    } else {
        Reply::text(format!(
            "Enter your daily {} limit in {}:",
            n.label().to_lowercase(),
            n.unit()
        ))
    };
    reply.keyboard(Keyboard::Cancel)
}

pub fn invalid_macro(which: MacroField) -> Reply {
    let hint = if which.is_optional() {
        "a positive number, or \"-\" to skip"
    } else {
        "a positive number"
    };
    let mut reply = ask_macro(which);
    reply.text = format!("❌ Please enter {hint}.\n\n{}", reply.text);
    reply
}

pub fn limits_saved(profile: &UserProfile) -> Reply {
    let limits = profile.limits();
    let mut text = String::from("✅ Your daily limits are saved:\n");
    for n in Nutrient::ALL {
        if let Some(v) = limits.get(n) {
            let _ = write!(text, "\n{}: {} {}", n.label(), num(v), n.unit());
        }
    }
    Reply::text(text).keyboard(Keyboard::Main)
}

pub fn ask_weight() -> Reply {
    Reply::text("⚖️ Enter your weight in kg:").keyboard(Keyboard::Cancel)
}

pub fn invalid_weight() -> Reply {
    Reply::text("❌ Please enter your weight as a positive number of kg.").keyboard(Keyboard::Cancel)
}

pub fn ask_body_fat() -> Reply {
    Reply::text("Enter your body fat percentage (0-99):").keyboard(Keyboard::Cancel)
}

pub fn invalid_body_fat() -> Reply {
    Reply::text("❌ Please enter a body fat percentage from 0 up to (but not including) 100.")
        .keyboard(Keyboard::Cancel)
}

pub fn metrics_saved(profile: &UserProfile) -> Reply {
    let mut reply = limits_saved(profile);
    reply.text.push_str(
        "\n\nThese targets come from a simple linear estimate based on your weight and body fat. \
         They are not medical advice.",
    );
    reply
}

pub fn timezone_picker(page: &TimezonePage, current_code: &str, now: OffsetDateTime) -> Reply {
    let mut rows: Vec<Vec<Choice>> = page
        .entries
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|e| {
                    let mark = if e.code == current_code { "✅ " } else { "" };
                    Choice::new(
                        format!("{mark}{} ({})", e.code, timezones::utc_offset_label(e.code, now)),
                        Action::Timezone(e.code.to_string()),
                    )
                })
                .collect()
        })
        .collect();

    let mut nav = Vec::new();
    if page.has_prev {
        nav.push(Choice::new("« Back", Action::TimezonePage(page.page - 1)));
    }
    if page.has_next {
        nav.push(Choice::new("Next »", Action::TimezonePage(page.page + 1)));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    Reply::text(format!(
        "🌍 Your timezone: {current_code} ({}, {})\n\nPick a new one or type its code (page {} of {}):",
        timezones::zone_name(current_code),
        timezones::utc_offset_label(current_code, now),
        page.page + 1,
        page.total_pages,
    ))
    .choices(rows)
    .keyboard(Keyboard::Cancel)
}

pub fn unknown_timezone(code: &str) -> Reply {
    Reply::text(format!("❌ \"{code}\" is not a timezone I know. Pick one from the list."))
}

pub fn timezone_set(profile: &UserProfile, now: OffsetDateTime) -> Reply {
    let code = &profile.timezone_code;
    Reply::text(format!(
        "✅ Timezone set to {code} ({}, {}). Your local time is {}.",
        timezones::zone_name(code),
        timezones::utc_offset_label(code, now),
        dates::clock_time(profile.current_datetime(now)),
    ))
    .keyboard(Keyboard::Main)
}

/// Up to one decimal, without a trailing `.0`.
fn num(v: f64) -> String {
    let r = (v * 10.0).round() / 10.0;
    if r.fract() == 0.0 {
        format!("{r:.0}")
    } else {
        format!("{r:.1}")
    }
}

#[cfg(test)]
mod render_tests {
    use super::*;
    use crate::profiles::NutrientLimits;
    use crate::stats::services::compute_daily_stats;
    use time::macros::date;

    #[test]
    fn numbers_drop_trailing_zero() {
        assert_eq!(num(250.0), "250");
        assert_eq!(num(12.34), "12.3");
        assert_eq!(num(0.06), "0.1");
    }

    #[test]
    fn empty_day_shows_limit() {
        let limits = NutrientLimits {
            calories: Some(2000),
            ..Default::default()
        };
        let s = compute_daily_stats(date!(2024-03-01), &[], limits);
        let text = stats("📊 Today", &s).text;
        assert!(text.contains("01.03.2024"));
        assert!(text.contains("No entries yet"));
        assert!(text.contains("Calorie limit: 2000 kcal"));
        assert!(text.contains("Left: 2000 kcal"));
    }

    #[test]
    fn zero_limit_shows_the_same_target_as_the_bar() {
        let limits = NutrientLimits {
            cholesterol: Some(0.0),
            ..Default::default()
        };
        let s = compute_daily_stats(date!(2024-03-01), &[], limits);
        let text = stats("📊 Today", &s).text;
        assert!(text.contains("Cholesterol: 0 / 300 mg"));
        assert!(!text.contains("/ 0 mg"));
    }

    #[test]
    fn picker_marks_current_and_paginates() {
        let page = timezones::page(0, TIMEZONE_PAGE_SIZE);
        let now = time::macros::datetime!(2024-03-01 12:00 UTC);
        let reply = timezone_picker(&page, "MSK", now);
        assert!(reply.choices[0][0].label.starts_with("✅ MSK"));
        assert!(reply.tokens().contains(&"tz_page:1"));
        assert!(!reply.tokens().iter().any(|t| t.starts_with("tz_page:0")));
    }
}
