use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{instrument, warn};

use crate::{
    auth::AuthUser,
    conversation::events::{Event, Reply},
    state::AppState,
};

/// One transport event, as the chat gateway forwards it.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEventRequest {
    Text { text: String },
    Button { token: String },
    Cancel,
    Photo { image_b64: String },
}

impl ChatEventRequest {
    fn into_event(self) -> Result<Event, (StatusCode, String)> {
        Ok(match self {
            ChatEventRequest::Text { text } => Event::TextReceived(text),
            ChatEventRequest::Button { token } => Event::ButtonPressed(token),
            ChatEventRequest::Cancel => Event::CancelRequested,
            ChatEventRequest::Photo { image_b64 } => {
                let bytes = general_purpose::STANDARD
                    .decode(image_b64.trim())
                    .map_err(|_| (StatusCode::BAD_REQUEST, "invalid base64".to_string()))?;
                if bytes.is_empty() {
                    return Err((StatusCode::BAD_REQUEST, "image is empty".into()));
                }
                Event::PhotoReceived(Bytes::from(bytes))
            }
        })
    }
}

pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/chat/events", post(post_event))
        .route("/chat/photo", post(post_photo))
}

#[instrument(skip(state, body))]
pub async fn post_event(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<ChatEventRequest>,
) -> Result<Json<Vec<Reply>>, (StatusCode, String)> {
    let event = body.into_event()?;
    Ok(Json(state.conversations.handle(user_id, event).await))
}

/// POST /chat/photo (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn post_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Json<Vec<Reply>>, (StatusCode, String)> {
    let mut image: Option<Bytes> = None;
    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        if matches!(field.name(), Some("file") | Some("photo")) {
            image = Some(field.bytes().await.map_err(bad_multipart)?);
            break;
        }
    }
    let image = image
        .filter(|b| !b.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "file is required".to_string()))?;
    Ok(Json(
        state
            .conversations
            .handle(user_id, Event::PhotoReceived(image))
            .await,
    ))
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> (StatusCode, String) {
    warn!(error = %e, "malformed multipart body");
    (StatusCode::BAD_REQUEST, "malformed multipart body".into())
}

#[cfg(test)]
mod chat_handler_tests {
    use super::*;

    #[test]
    fn event_payloads_decode() {
        let ev: ChatEventRequest =
            serde_json::from_str(r#"{"type":"button","token":"confirm"}"#).unwrap();
        assert!(matches!(ev.into_event(), Ok(Event::ButtonPressed(t)) if t == "confirm"));

        let ev: ChatEventRequest = serde_json::from_str(r#"{"type":"cancel"}"#).unwrap();
        assert!(matches!(ev.into_event(), Ok(Event::CancelRequested)));

        let ev: ChatEventRequest =
            serde_json::from_str(r#"{"type":"photo","image_b64":"/9j/4A=="}"#).unwrap();
        assert!(matches!(ev.into_event(), Ok(Event::PhotoReceived(b)) if b.len() == 4));
    }

    #[test]
    fn bad_base64_is_rejected() {
        let ev = ChatEventRequest::Photo {
            image_b64: "not base64!".into(),
        };
        assert_eq!(ev.into_event().err().map(|e| e.0), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn text_event_goes_through_the_machine() {
        let state = AppState::fake();
        let Json(replies) = post_event(
            State(state.clone()),
            AuthUser(5),
            Json(ChatEventRequest::Text {
                text: "/setlimit".into(),
            }),
        )
        .await
        .unwrap();
        assert!(replies[0].text.contains("calorie limit"));

        let Json(replies) = post_event(
            State(state),
            AuthUser(5),
            Json(ChatEventRequest::Text {
                text: "2100".into(),
            }),
        )
        .await
        .unwrap();
        assert!(replies[0].text.contains("2100 kcal"));
    }
}
