use bytes::Bytes;
use serde::Serialize;
use time::Date;

use crate::dates;

#[derive(Debug, Clone)]
pub enum Event {
    PhotoReceived(Bytes),
    TextReceived(String),
    ButtonPressed(String),
    CancelRequested,
}

pub const BTN_ADD_FOOD: &str = "📸 Add food";
pub const BTN_TODAY: &str = "📊 Today's stats";
pub const BTN_HISTORY: &str = "📅 History";
pub const BTN_SET_LIMIT: &str = "⚙️ Set calorie limit";
pub const BTN_CANCEL: &str = "❌ Cancel";

/// Persistent keyboard the transport should show after a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Keyboard {
    Main,
    Cancel,
    /// Leave whatever is shown.
    Keep,
}

impl Keyboard {
    #[cfg(test)]
    pub fn buttons(self) -> Vec<Vec<&'static str>> {
        match self {
            Keyboard::Main => vec![vec![BTN_ADD_FOOD, BTN_TODAY], vec![BTN_HISTORY, BTN_SET_LIMIT]],
            Keyboard::Cancel => vec![vec![BTN_CANCEL]],
            Keyboard::Keep => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub label: String,
    pub token: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            token: action.token(),
        }
    }
}

/// Platform-neutral render instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Vec<Choice>>,
    pub keyboard: Keyboard,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: Vec::new(),
            keyboard: Keyboard::Keep,
        }
    }

    pub fn keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn choices(mut self, rows: Vec<Vec<Choice>>) -> Self {
        self.choices = rows;
        self
    }

    /// Every token offered by this reply, row by row.
    #[cfg(test)]
    pub fn tokens(&self) -> Vec<&str> {
        self.choices
            .iter()
            .flatten()
            .map(|c| c.token.as_str())
            .collect()
    }
}

/// Decoded button token. Context such as the viewed date travels inside the
/// token itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Photo,
    Today,
    History,
    Day(Date),
    Delete { date: Date, index: usize },
    Confirm,
    Cancel,
    SetLimit,
    SetMacros,
    SetMetrics,
    SetTimezone,
    Timezone(String),
    TimezonePage(usize),
    Skip,
}

impl Action {
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let action = match token {
            "photo" => Action::Photo,
            "today" => Action::Today,
            "history" => Action::History,
            "confirm" => Action::Confirm,
            "cancel" => Action::Cancel,
            "set_limit" => Action::SetLimit,
            "set_macros" => Action::SetMacros,
            "set_metrics" => Action::SetMetrics,
            "set_timezone" => Action::SetTimezone,
            "skip" => Action::Skip,
            _ => {
                let (kind, rest) = token.split_once(':')?;
                match kind {
                    "day" => Action::Day(dates::parse_iso(rest)?),
                    "del" => {
                        let (date, index) = rest.split_once(':')?;
                        Action::Delete {
                            date: dates::parse_iso(date)?,
                            index: index.parse().ok()?,
                        }
                    }
                    "tz" if !rest.is_empty() => Action::Timezone(rest.to_string()),
                    "tz_page" => Action::TimezonePage(rest.parse().ok()?),
                    _ => return None,
                }
            }
        };
        Some(action)
    }

    pub fn token(&self) -> String {
        match self {
            Action::Photo => "photo".into(),
            Action::Today => "today".into(),
            Action::History => "history".into(),
            Action::Day(d) => format!("day:{}", dates::iso(*d)),
            Action::Delete { date, index } => format!("del:{}:{index}", dates::iso(*date)),
            Action::Confirm => "confirm".into(),
            Action::Cancel => "cancel".into(),
            Action::SetLimit => "set_limit".into(),
            Action::SetMacros => "set_macros".into(),
            Action::SetMetrics => "set_metrics".into(),
            Action::SetTimezone => "set_timezone".into(),
            Action::Timezone(code) => format!("tz:{code}"),
            Action::TimezonePage(p) => format!("tz_page:{p}"),
            Action::Skip => "skip".into(),
        }
    }

    /// Persistent-keyboard labels arrive as plain text.
    pub fn from_button_label(text: &str) -> Option<Self> {
        match text.trim() {
            BTN_ADD_FOOD => Some(Action::Photo),
            BTN_TODAY => Some(Action::Today),
            BTN_HISTORY => Some(Action::History),
            BTN_SET_LIMIT => Some(Action::SetLimit),
            BTN_CANCEL => Some(Action::Cancel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Today,
    SetLimit,
    Macros,
    Metrics,
    Timezone,
    History,
    Cancel,
}

impl Command {
    /// `/name` or `/name@botname`, arguments ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().strip_prefix('/')?.split_whitespace().next()?;
        let name = word.split('@').next().unwrap_or(word);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "today" => Some(Command::Today),
            "setlimit" => Some(Command::SetLimit),
            "macros" => Some(Command::Macros),
            "metrics" => Some(Command::Metrics),
            "timezone" => Some(Command::Timezone),
            "history" => Some(Command::History),
            "cancel" => Some(Command::Cancel),
            _ => None,
        }
    }
}
