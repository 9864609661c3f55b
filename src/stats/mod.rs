pub mod progress;
pub mod services;

pub use progress::ProgressBar;
pub use services::{DailyStats, Nutrient, StatsService};
