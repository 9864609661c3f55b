use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use super::{NutrientEstimate, VisionAnalyzer};
use crate::config::VisionConfig;
use crate::error::DiaryError;

const PROMPT: &str = "\
Analyze this photo of food and estimate, for the whole portion shown:
1. the name of the dish
2. calories (kcal)
3. protein (g)
4. fat (g)
5. carbohydrates (g)
6. fiber (g)
7. sugar (g)
8. sodium (mg)
9. cholesterol (mg)

Reply with JSON only, in exactly this shape:
{\"food_name\": \"dish name\", \"calories\": number, \"protein\": number, \"fat\": number, \
\"carbs\": number, \"fiber\": number, \"sugar\": number, \"sodium\": number, \"cholesterol\": number}

Use 0 for any nutrient you cannot estimate. If there is no food in the photo, reply {}.";

const MAX_TOKENS: u32 = 800;

#[derive(Debug, Clone)]
pub struct OpenAiVisionClient {
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    response_format: ResponseFormat,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiVisionClient {
    pub fn new(api_key: String, cfg: &VisionConfig) -> Self {
        Self {
            api_key,
            model: cfg.model.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(cfg.timeout_secs.max(1)),
            client: Client::new(),
        }
    }

    fn request_body(&self, image: &[u8]) -> ChatRequest<'_> {
        let data_url = format!(
            "data:{};base64,{}",
            mime_from_magic(image),
            general_purpose::STANDARD.encode(image)
        );
        ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: vec![
                    Part::Text {
                        text: PROMPT.to_string(),
                    },
                    Part::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            max_tokens: MAX_TOKENS,
        }
    }
}

#[async_trait]
impl VisionAnalyzer for OpenAiVisionClient {
    #[instrument(skip(self, image), fields(bytes = image.len(), model = %self.model))]
    async fn analyze(&self, image: Bytes) -> Result<Option<NutrientEstimate>, DiaryError> {
        self.request(&image).await.map_err(|e| {
            error!(error = %format!("{e:#}"), "vision request failed");
            DiaryError::AnalysisFailure
        })
    }
}

impl OpenAiVisionClient {
    async fn request(&self, image: &[u8]) -> anyhow::Result<Option<NutrientEstimate>> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&self.request_body(image))
            .send()
            .await
            .context("vision request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "vision api returned an error");
            anyhow::bail!("vision api returned {status}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("decode vision response")?;
        let Some(content) = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
        else {
            warn!("vision response had no content");
            return Ok(None);
        };
        debug!(content = %content, "vision response");
        Ok(parse_estimate(&content))
    }
}

/// `None` for unparseable content, a non-object, or an empty object (the
/// prompt's "no food" answer). Missing nutrient keys default to 0.
pub(crate) fn parse_estimate(content: &str) -> Option<NutrientEstimate> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let value: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "vision content is not json");
            return None;
        }
    };
    if value.as_object().map_or(true, |o| o.is_empty()) {
        return None;
    }
    match serde_json::from_value::<NutrientEstimate>(value) {
        Ok(e) => Some(e.sanitize()),
        Err(e) => {
            warn!(error = %e, "vision content has unexpected shape");
            None
        }
    }
}

fn mime_from_magic(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [_, _, _, _, b'f', b't', b'y', b'p', b'h', b'e', b'i', b'c', ..] => "image/heic",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod openai_tests {
    use super::*;

    fn client() -> OpenAiVisionClient {
        OpenAiVisionClient::new(
            "sk-test".into(),
            &VisionConfig {
                api_key: Some("sk-test".into()),
                model: "gpt-4o".into(),
                base_url: "https://example.invalid/v1/".into(),
                timeout_secs: 5,
            },
        )
    }

    #[test]
    fn request_carries_inline_image_and_json_format() {
        let c = client();
        let body = serde_json::to_value(c.request_body(&[0x89, b'P', b'N', b'G', 0, 0])).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["response_format"]["type"], "json_object");
        let parts = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        let url = parts[1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(c.base_url, "https://example.invalid/v1");
    }

    #[test]
    fn parses_fenced_json() {
        let e = parse_estimate("```json\n{\"food_name\":\"Soup\",\"calories\":180}\n```").unwrap();
        assert_eq!(e.food_name, "Soup");
        assert_eq!(e.calories, 180.0);
    }

    #[test]
    fn name_only_estimate_has_zero_nutrients() {
        let e = parse_estimate(r#"{"food_name":"Water"}"#).unwrap();
        assert_eq!(e.food_name, "Water");
        assert_eq!(e.calories, 0.0);
        assert_eq!(e.sodium, 0.0);
    }

    #[test]
    fn empty_or_garbage_content_is_no_estimate() {
        assert!(parse_estimate("{}").is_none());
        assert!(parse_estimate("I cannot see any food").is_none());
        assert!(parse_estimate("[1,2]").is_none());
    }

    #[test]
    fn detects_jpeg_and_defaults_to_it() {
        assert_eq!(mime_from_magic(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(mime_from_magic(b"RIFF\0\0\0\0WEBPVP8"), "image/webp");
        assert_eq!(mime_from_magic(&[1, 2, 3]), "image/jpeg");
    }
}
