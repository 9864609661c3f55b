pub mod events;
pub mod handlers;
mod input;
pub mod machine;
mod render;
pub mod state;

use crate::state::AppState;
use axum::Router;

pub use machine::ConversationMachine;

pub fn router() -> Router<AppState> {
    handlers::chat_routes()
}
