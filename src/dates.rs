use time::{macros::format_description, Date, OffsetDateTime};

/// `YYYY-MM-DD`, used in query strings and button payloads.
pub fn iso(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    date.format(&format).unwrap_or_default()
}

pub fn parse_iso(s: &str) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(s.trim(), &format).ok()
}

/// `DD.MM.YYYY`, used in user-facing text.
pub fn display(date: Date) -> String {
    let format = format_description!("[day].[month].[year]");
    date.format(&format).unwrap_or_default()
}

pub fn clock_time(at: OffsetDateTime) -> String {
    let format = format_description!("[hour]:[minute]");
    at.format(&format).unwrap_or_default()
}

pub mod iso_date {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use time::Date;

    pub fn serialize<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::iso(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Date, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_iso(&raw).ok_or_else(|| D::Error::custom("expected a YYYY-MM-DD date"))
    }
}
