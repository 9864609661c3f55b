use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use time::Date;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::events::{Action, Command, Event, Keyboard, Reply};
use super::input;
use super::render::{self, TIMEZONE_PAGE_SIZE};
use super::state::{ConversationState, MacroField};
use crate::diary::repo_types::NutrientFields;
use crate::diary::services::DiaryService;
use crate::error::DiaryError;
use crate::profiles::{services::ProfileService, MacroLimits};
use crate::stats::StatsService;
use crate::timezones;
use crate::vision::VisionAnalyzer;

type Slot = Arc<Mutex<ConversationState>>;
type Outcome = Result<Vec<Reply>, DiaryError>;

/// Per-user dialog driver. Events of one user run one at a time, in arrival
/// order (tokio's mutex is fair); different users never share a lock.
pub struct ConversationMachine {
    profiles: Arc<ProfileService>,
    diary: Arc<DiaryService>,
    stats: Arc<StatsService>,
    vision: Arc<dyn VisionAnalyzer>,
    sessions: DashMap<i64, Slot>,
    tickets: AtomicU64,
    history_days: usize,
}

impl ConversationMachine {
    pub fn new(
        profiles: Arc<ProfileService>,
        diary: Arc<DiaryService>,
        stats: Arc<StatsService>,
        vision: Arc<dyn VisionAnalyzer>,
        history_days: usize,
    ) -> Self {
        Self {
            profiles,
            diary,
            stats,
            vision,
            sessions: DashMap::new(),
            tickets: AtomicU64::new(0),
            history_days: history_days.max(1),
        }
    }

    fn slot(&self, user_id: i64) -> Slot {
        self.sessions.entry(user_id).or_default().value().clone()
    }

    #[cfg(test)]
    pub async fn current_state(&self, user_id: i64) -> ConversationState {
        let slot = self.sessions.get(&user_id).map(|s| s.value().clone());
        match slot {
            Some(slot) => slot.lock().await.clone(),
            None => ConversationState::Idle,
        }
    }

    #[instrument(skip(self, event))]
    pub async fn handle(&self, user_id: i64, event: Event) -> Vec<Reply> {
        let slot = self.slot(user_id);
        let replies = match event {
            Event::PhotoReceived(image) => self.on_photo(user_id, &slot, image).await,
            other => {
                let mut state = slot.lock().await;
                debug!(state = state.name(), "handling event");
                match self.dispatch(user_id, &mut state, other).await {
                    Ok(replies) => replies,
                    Err(e) => fail(user_id, &mut state, e),
                }
            }
        };
        drop(slot);
        self.release(user_id);
        replies
    }

    /// Drops an idle slot nobody else holds. The check runs under the map's
    /// shard lock, so a concurrent `slot()` either sees the entry before it is
    /// removed (and keeps it alive) or creates a fresh one after.
    fn release(&self, user_id: i64) {
        self.sessions.remove_if(&user_id, |_, slot| {
            Arc::strong_count(slot) == 1
                && slot
                    .try_lock()
                    .is_ok_and(|state| *state == ConversationState::Idle)
        });
    }

    #[cfg(test)]
    fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    async fn dispatch(&self, user_id: i64, state: &mut ConversationState, event: Event) -> Outcome {
        match event {
            Event::CancelRequested => Ok(cancel(state)),
            Event::ButtonPressed(token) => match Action::parse(&token) {
                Some(action) => self.on_action(user_id, state, action).await,
                None => {
                    warn!(token = %token, "unrecognized button token");
                    Ok(vec![render::unknown_button()])
                }
            },
            Event::TextReceived(text) => {
                if let Some(cmd) = Command::parse(&text) {
                    return self.on_command(user_id, state, cmd).await;
                }
                if let Some(action) = Action::from_button_label(&text) {
                    return self.on_action(user_id, state, action).await;
                }
                self.on_text(user_id, state, text.trim()).await
            }
            Event::PhotoReceived(_) => Ok(Vec::new()),
        }
    }

    async fn on_command(&self, user_id: i64, state: &mut ConversationState, cmd: Command) -> Outcome {
        let action = match cmd {
            Command::Start => {
                self.profiles.load(user_id).await?;
                *state = ConversationState::Idle;
                return Ok(vec![render::welcome()]);
            }
            Command::Help => return Ok(vec![render::help()]),
            Command::Today => Action::Today,
            Command::SetLimit => Action::SetLimit,
            Command::Macros => Action::SetMacros,
            Command::Metrics => Action::SetMetrics,
            Command::Timezone => Action::SetTimezone,
            Command::History => Action::History,
            Command::Cancel => Action::Cancel,
        };
        self.on_action(user_id, state, action).await
    }

    async fn on_action(&self, user_id: i64, state: &mut ConversationState, action: Action) -> Outcome {
        match action {
            Action::Photo => {
                *state = ConversationState::AwaitingPhoto;
                Ok(vec![render::ask_photo()])
            }
            Action::Today => {
                let stats = self.stats.today(user_id).await?;
                Ok(vec![render::stats("📊 Today", &stats)])
            }
            Action::History => {
                let dates = self.diary.last_n_dates(user_id, self.history_days).await?;
                Ok(vec![render::history(&dates)])
            }
            Action::Day(date) => Ok(vec![self.day_view(user_id, date).await?]),
            Action::Delete { date, index } => {
                let head = if self.diary.delete_by_display_index(user_id, date, index).await? {
                    render::entry_deleted()
                } else {
                    render::entry_not_found()
                };
                Ok(vec![head, self.day_view(user_id, date).await?])
            }
            Action::Confirm => self.confirm(user_id, state).await,
            Action::Cancel => Ok(cancel(state)),
            Action::SetLimit => {
                let profile = self.profiles.load(user_id).await?;
                *state = ConversationState::AwaitingCalorieLimit;
                Ok(vec![render::ask_calorie_limit(profile.calorie_limit)])
            }
            Action::SetMacros => {
                *state = ConversationState::AwaitingMacroLimit {
                    which: MacroField::Protein,
                    draft: MacroLimits::default(),
                };
                Ok(vec![render::ask_macro(MacroField::Protein)])
            }
            Action::SetMetrics => {
                *state = ConversationState::AwaitingWeight;
                Ok(vec![render::ask_weight()])
            }
            Action::SetTimezone => self.show_timezones(user_id, state, 0).await,
            Action::TimezonePage(page) => self.show_timezones(user_id, state, page).await,
            Action::Timezone(code) => self.choose_timezone(user_id, state, &code).await,
            Action::Skip => match state.clone() {
                ConversationState::AwaitingMacroLimit { which, draft } if which.is_optional() => {
                    self.advance_macros(user_id, state, which, draft, None).await
                }
                _ => Ok(vec![render::nothing_to_skip()]),
            },
        }
    }

    async fn on_text(&self, user_id: i64, state: &mut ConversationState, text: &str) -> Outcome {
        match state.clone() {
            ConversationState::Idle => Ok(vec![render::idle_hint()]),
            ConversationState::AwaitingPhoto => Ok(vec![render::ask_photo()]),
            ConversationState::AwaitingAnalysis { .. } => Ok(vec![render::still_analyzing()]),
            ConversationState::AwaitingConfirmation { pending } => {
                Ok(vec![render::confirm_or_cancel(&pending)])
            }
            ConversationState::AwaitingCalorieLimit => match input::parse_whole(text) {
                Some(limit) if limit > 0 => {
                    let profile = self.profiles.set_calorie_limit(user_id, limit).await?;
                    *state = ConversationState::Idle;
                    info!(user_id, limit, "calorie limit set");
                    Ok(vec![render::calorie_limit_set(
                        profile.calorie_limit.unwrap_or(limit),
                    )])
                }
                _ => Ok(vec![render::invalid_calorie_limit()]),
            },
            ConversationState::AwaitingMacroLimit { which, draft } => {
                if which.is_optional() && input::is_skip(text) {
                    return self.advance_macros(user_id, state, which, draft, None).await;
                }
                match input::parse_number(text) {
                    Some(v) if v > 0.0 => {
                        self.advance_macros(user_id, state, which, draft, Some(v)).await
                    }
                    _ => Ok(vec![render::invalid_macro(which)]),
                }
            }
            ConversationState::AwaitingTimezoneChoice { .. } => {
                self.choose_timezone(user_id, state, text).await
            }
            ConversationState::AwaitingWeight => match input::parse_number(text) {
                Some(weight) if weight > 0.0 => {
                    *state = ConversationState::AwaitingBodyFat { weight };
                    Ok(vec![render::ask_body_fat()])
                }
                _ => Ok(vec![render::invalid_weight()]),
            },
            ConversationState::AwaitingBodyFat { weight } => match input::parse_number(text) {
                // 100% would leave no lean mass to derive protein from
                Some(bf) if bf < 100.0 => {
                    let profile = self.profiles.set_body_metrics(user_id, weight, bf).await?;
                    *state = ConversationState::Idle;
                    info!(user_id, "limits derived from body metrics");
                    Ok(vec![render::metrics_saved(&profile)])
                }
                _ => Ok(vec![render::invalid_body_fat()]),
            },
        }
    }

    async fn advance_macros(
        &self,
        user_id: i64,
        state: &mut ConversationState,
        which: MacroField,
        mut draft: MacroLimits,
        value: Option<f64>,
    ) -> Outcome {
        which.apply(&mut draft, value);
        match which.next() {
            Some(next) => {
                *state = ConversationState::AwaitingMacroLimit { which: next, draft };
                Ok(vec![render::ask_macro(next)])
            }
            None => {
                let profile = self.profiles.set_macro_limits(user_id, draft).await?;
                *state = ConversationState::Idle;
                info!(user_id, calorie_limit = ?profile.calorie_limit, "macro limits set");
                Ok(vec![render::limits_saved(&profile)])
            }
        }
    }

    async fn confirm(&self, user_id: i64, state: &mut ConversationState) -> Outcome {
        let pending = match std::mem::take(state) {
            ConversationState::AwaitingConfirmation { pending } => pending,
            other => {
                debug!(state = other.name(), "confirm without pending analysis");
                *state = other;
                return Ok(vec![render::nothing_to_confirm()]);
            }
        };
        let record = self.diary.append(user_id, pending).await?;
        // The entry is stored at this point; the reply has to say so.
        match self.stats.today(user_id).await {
            Ok(stats) => Ok(vec![render::recorded(&record, &stats)]),
            Err(e) => {
                warn!(user_id, id = record.id, error = %e, "stats unavailable after recording");
                Ok(vec![render::recorded_without_stats(&record)])
            }
        }
    }

    async fn show_timezones(&self, user_id: i64, state: &mut ConversationState, page: usize) -> Outcome {
        let profile = self.profiles.load(user_id).await?;
        let page = timezones::page(page, TIMEZONE_PAGE_SIZE);
        *state = ConversationState::AwaitingTimezoneChoice { page: page.page };
        Ok(vec![render::timezone_picker(
            &page,
            &profile.timezone_code,
            self.profiles.now_utc(),
        )])
    }

    async fn choose_timezone(&self, user_id: i64, state: &mut ConversationState, code: &str) -> Outcome {
        match self.profiles.set_timezone(user_id, code).await {
            Ok(profile) => {
                *state = ConversationState::Idle;
                info!(user_id, code = %profile.timezone_code, "timezone changed");
                Ok(vec![render::timezone_set(&profile, self.profiles.now_utc())])
            }
            Err(DiaryError::InvalidTimezone(bad)) => {
                let page = match state {
                    ConversationState::AwaitingTimezoneChoice { page } => *page,
                    _ => 0,
                };
                let mut replies = vec![render::unknown_timezone(&bad)];
                replies.extend(self.show_timezones(user_id, state, page).await?);
                Ok(replies)
            }
            Err(e) => Err(e),
        }
    }

    async fn day_view(&self, user_id: i64, date: Date) -> Result<Reply, DiaryError> {
        let profile = self.profiles.load(user_id).await?;
        let stats = self.stats.stats_for_date(user_id, date).await?;
        let records = self.diary.records_for_profile(&profile, date).await?;
        Ok(render::day_view(&stats, &records, &profile.timezone_code))
    }

    /// The lock is dropped while the vision call runs, so a cancel or a newer
    /// photo can get in; the result is applied only if its ticket is still
    /// the one being awaited.
    async fn on_photo(&self, user_id: i64, slot: &Slot, image: Bytes) -> Vec<Reply> {
        let ticket = {
            let mut state = slot.lock().await;
            if state.awaits_number() {
                debug!(state = state.name(), "photo while awaiting a number");
                return vec![reprompt(&state)];
            }
            let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
            *state = ConversationState::AwaitingAnalysis { ticket };
            ticket
        };

        let outcome = self.vision.analyze(image).await;

        let mut state = slot.lock().await;
        if *state != (ConversationState::AwaitingAnalysis { ticket }) {
            info!(user_id, ticket, "discarding stale analysis result");
            return Vec::new();
        }
        match outcome {
            Ok(Some(estimate)) => {
                let fields = NutrientFields::from(estimate);
                info!(user_id, ticket, food = %fields.food_name, "photo analyzed");
                let reply = render::analysis(&fields);
                *state = ConversationState::AwaitingConfirmation { pending: fields };
                vec![reply]
            }
            Ok(None) => {
                info!(user_id, ticket, "no food recognized");
                *state = ConversationState::Idle;
                vec![render::analysis_failed()]
            }
            Err(e) => {
                warn!(user_id, ticket, error = %e, "vision analysis failed");
                *state = ConversationState::Idle;
                vec![render::analysis_error()]
            }
        }
    }
}

fn cancel(state: &mut ConversationState) -> Vec<Reply> {
    *state = ConversationState::Idle;
    vec![render::cancelled()]
}

fn reprompt(state: &ConversationState) -> Reply {
    match state {
        ConversationState::AwaitingCalorieLimit => render::ask_calorie_limit(None),
        ConversationState::AwaitingMacroLimit { which, .. } => render::ask_macro(*which),
        ConversationState::AwaitingWeight => render::ask_weight(),
        ConversationState::AwaitingBodyFat { .. } => render::ask_body_fat(),
        _ => render::idle_hint(),
    }
}

/// Unexpected failures end the dialog; nothing transient survives them.
fn fail(user_id: i64, state: &mut ConversationState, e: DiaryError) -> Vec<Reply> {
    *state = ConversationState::Idle;
    match e {
        DiaryError::Persistence(inner) => {
            error!(user_id, error = %inner, "storage failure during conversation");
            vec![render::storage_failure()]
        }
        other => {
            warn!(user_id, error = %other, "conversation step rejected");
            vec![Reply::text(format!("❌ {other}")).keyboard(Keyboard::Main)]
        }
    }
}
