use crate::diary::repo_types::NutrientFields;
use crate::profiles::MacroLimits;
use crate::stats::Nutrient;

/// Step of the manual macro-limit dialog, in prompt order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroField {
    Protein,
    Fat,
    Carbs,
    Fiber,
    Sugar,
    Sodium,
    Cholesterol,
}

impl MacroField {
    pub fn next(self) -> Option<Self> {
        use MacroField::*;
        match self {
            Protein => Some(Fat),
            Fat => Some(Carbs),
            Carbs => Some(Fiber),
            Fiber => Some(Sugar),
            Sugar => Some(Sodium),
            Sodium => Some(Cholesterol),
            Cholesterol => None,
        }
    }

    /// Micro steps may be skipped; macro steps need a positive number.
    pub fn is_optional(self) -> bool {
        !matches!(self, MacroField::Protein | MacroField::Fat | MacroField::Carbs)
    }

    pub fn nutrient(self) -> Nutrient {
        match self {
            MacroField::Protein => Nutrient::Protein,
            MacroField::Fat => Nutrient::Fat,
            MacroField::Carbs => Nutrient::Carbs,
            MacroField::Fiber => Nutrient::Fiber,
            MacroField::Sugar => Nutrient::Sugar,
            MacroField::Sodium => Nutrient::Sodium,
            MacroField::Cholesterol => Nutrient::Cholesterol,
        }
    }

    pub fn apply(self, draft: &mut MacroLimits, value: Option<f64>) {
        match self {
            MacroField::Protein => draft.protein = value.unwrap_or_default(),
            MacroField::Fat => draft.fat = value.unwrap_or_default(),
            MacroField::Carbs => draft.carbs = value.unwrap_or_default(),
            MacroField::Fiber => draft.fiber = value,
            MacroField::Sugar => draft.sugar = value,
            MacroField::Sodium => draft.sodium = value,
            MacroField::Cholesterol => draft.cholesterol = value,
        }
    }
}

/// At most one per user. Everything transient (pending analysis, partially
/// entered limits, picker page) lives here rather than in rendered text.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingPhoto,
    AwaitingAnalysis {
        ticket: u64,
    },
    AwaitingConfirmation {
        pending: NutrientFields,
    },
    AwaitingCalorieLimit,
    AwaitingMacroLimit {
        which: MacroField,
        draft: MacroLimits,
    },
    AwaitingTimezoneChoice {
        page: usize,
    },
    AwaitingWeight,
    AwaitingBodyFat {
        weight: f64,
    },
}

impl ConversationState {
    /// States that only a number (or cancel) can move forward.
    pub fn awaits_number(&self) -> bool {
        matches!(
            self,
            ConversationState::AwaitingCalorieLimit
                | ConversationState::AwaitingMacroLimit { .. }
                | ConversationState::AwaitingWeight
                | ConversationState::AwaitingBodyFat { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::AwaitingPhoto => "awaiting_photo",
            ConversationState::AwaitingAnalysis { .. } => "awaiting_analysis",
            ConversationState::AwaitingConfirmation { .. } => "awaiting_confirmation",
            ConversationState::AwaitingCalorieLimit => "awaiting_calorie_limit",
            ConversationState::AwaitingMacroLimit { .. } => "awaiting_macro_limit",
            ConversationState::AwaitingTimezoneChoice { .. } => "awaiting_timezone_choice",
            ConversationState::AwaitingWeight => "awaiting_weight",
            ConversationState::AwaitingBodyFat { .. } => "awaiting_body_fat",
        }
    }
}
