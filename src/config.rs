use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Without a database the diary lives in process memory.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub vision: VisionConfig,
    pub history_days: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "calorie-diary".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "calorie-diary-gateway".into()),
        };
        let vision = VisionConfig {
            api_key: std::env::var("OPENAI_API_KEY").ok().filter(|v| !v.is_empty()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            timeout_secs: std::env::var("VISION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60),
        };
        let history_days = std::env::var("HISTORY_DAYS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|d| *d > 0)
            .unwrap_or(7);
        Ok(Self {
            database_url,
            jwt,
            vision,
            history_days,
        })
    }
}
