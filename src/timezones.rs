use serde::Serialize;
use time::OffsetDateTime;
use time_tz::{timezones, OffsetDateTimeExt, Tz};

/// Code assigned to new profiles and used for every unknown code.
pub const DEFAULT_TIMEZONE_CODE: &str = "MSK";

/// Ordered short code → IANA zone table. Order is what the picker shows.
const TIMEZONES: &[(&str, &str)] = &[
    ("MSK", "Europe/Moscow"),
    ("UTC", "Etc/UTC"),
    ("CET", "Europe/Paris"),
    ("EET", "Europe/Kyiv"),
    ("GMT", "Etc/GMT"),
    ("SAMT", "Europe/Samara"),
    ("EKAT", "Asia/Yekaterinburg"),
    ("OMST", "Asia/Omsk"),
    ("NOVS", "Asia/Novosibirsk"),
    ("KRAT", "Asia/Krasnoyarsk"),
    ("IRKT", "Asia/Irkutsk"),
    ("VLAD", "Asia/Vladivostok"),
    ("MAGA", "Asia/Magadan"),
    ("PET", "Asia/Kamchatka"),
    ("BAKU", "Asia/Baku"),
    ("TBIL", "Asia/Tbilisi"),
    ("YREV", "Asia/Yerevan"),
    ("MINS", "Europe/Minsk"),
];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimezoneEntry {
    pub code: &'static str,
    pub zone: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimezonePage {
    pub page: usize,
    pub total_pages: usize,
    pub entries: Vec<TimezoneEntry>,
    pub has_prev: bool,
    pub has_next: bool,
}

pub fn default_zone() -> &'static Tz {
    timezones::db::europe::MOSCOW
}

pub fn is_known(code: &str) -> bool {
    TIMEZONES.iter().any(|(c, _)| *c == code)
}

/// IANA name for `code`, or the default zone's name.
pub fn zone_name(code: &str) -> &'static str {
    TIMEZONES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, zone)| *zone)
        .unwrap_or("Europe/Moscow")
}

/// Never fails: unknown codes and zones missing from the tz database resolve
/// to the default zone. Persisting the corrected code is the caller's job.
pub fn resolve(code: &str) -> &'static Tz {
    if !is_known(code) {
        return default_zone();
    }
    timezones::get_by_name(zone_name(code)).unwrap_or_else(default_zone)
}

pub fn now_in(code: &str, now_utc: OffsetDateTime) -> OffsetDateTime {
    now_utc.to_timezone(resolve(code))
}

/// Current offset of the zone behind `code`, rendered as `UTC+3` or `UTC+5:30`.
pub fn utc_offset_label(code: &str, now_utc: OffsetDateTime) -> String {
    let offset = now_in(code, now_utc).offset();
    let total_minutes = offset.whole_minutes();
    if total_minutes == 0 {
        return "UTC+0".to_string();
    }
    let sign = if total_minutes < 0 { '-' } else { '+' };
    let hours = total_minutes.abs() / 60;
    let minutes = total_minutes.abs() % 60;
    if minutes == 0 {
        format!("UTC{sign}{hours}")
    } else {
        format!("UTC{sign}{hours}:{minutes:02}")
    }
}

pub fn page_count(page_size: usize) -> usize {
    let size = page_size.max(1);
    TIMEZONES.len().div_ceil(size)
}

/// Fixed-size slice of the table. Out-of-range indexes clamp to the last page.
pub fn page(index: usize, page_size: usize) -> TimezonePage {
    let size = page_size.max(1);
    let total_pages = page_count(size);
    let page = index.min(total_pages.saturating_sub(1));
    let entries = TIMEZONES
        .iter()
        .skip(page * size)
        .take(size)
        .map(|(code, zone)| TimezoneEntry { code, zone })
        .collect();
    TimezonePage {
        page,
        total_pages,
        entries,
        has_prev: page > 0,
        has_next: page + 1 < total_pages,
    }
}
