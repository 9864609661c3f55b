use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::conversation::ConversationMachine;
use crate::diary::{repo::DiaryRepository, repo::PgDiaryRepository, DiaryService};
use crate::memory::MemoryStore;
use crate::profiles::{repo::PgProfileRepository, repo::ProfileRepository, services::ProfileService};
use crate::stats::StatsService;
use crate::vision::{openai::OpenAiVisionClient, UnconfiguredVision, VisionAnalyzer};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub profiles: Arc<ProfileService>,
    pub diary: Arc<DiaryService>,
    pub stats: Arc<StatsService>,
    pub conversations: Arc<ConversationMachine>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (profile_repo, diary_repo): (Arc<dyn ProfileRepository>, Arc<dyn DiaryRepository>) =
            match config.database_url.as_deref() {
                Some(url) => {
                    let db = crate::db::connect(url).await?;
                    (
                        Arc::new(PgProfileRepository::new(db.clone())) as Arc<dyn ProfileRepository>,
                        Arc::new(PgDiaryRepository::new(db)) as Arc<dyn DiaryRepository>,
                    )
                }
                None => {
                    tracing::warn!("DATABASE_URL not set; diary is kept in memory only");
                    let store = Arc::new(MemoryStore::new(clock.clone()));
                    (
                        store.clone() as Arc<dyn ProfileRepository>,
                        store as Arc<dyn DiaryRepository>,
                    )
                }
            };

        let vision: Arc<dyn VisionAnalyzer> = match config.vision.api_key.clone() {
            Some(key) => Arc::new(OpenAiVisionClient::new(key, &config.vision)),
            None => {
                tracing::warn!("OPENAI_API_KEY not set; photo analysis is disabled");
                Arc::new(UnconfiguredVision)
            }
        };

        Ok(Self::from_parts(
            config,
            profile_repo,
            diary_repo,
            vision,
            clock,
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        profile_repo: Arc<dyn ProfileRepository>,
        diary_repo: Arc<dyn DiaryRepository>,
        vision: Arc<dyn VisionAnalyzer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let profiles = Arc::new(ProfileService::new(profile_repo, clock));
        let diary = Arc::new(DiaryService::new(diary_repo, profiles.clone()));
        let stats = Arc::new(StatsService::new(diary.clone(), profiles.clone()));
        let conversations = Arc::new(ConversationMachine::new(
            profiles.clone(),
            diary.clone(),
            stats.clone(),
            vision,
            config.history_days,
        ));
        Self {
            config,
            profiles,
            diary,
            stats,
            conversations,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
            },
            vision: crate::config::VisionConfig {
                api_key: None,
                model: "fake".into(),
                base_url: "http://127.0.0.1:9".into(),
                timeout_secs: 1,
            },
            history_days: 7,
        });
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryStore::new(clock.clone()));
        Self::from_parts(
            config,
            store.clone(),
            store,
            Arc::new(UnconfiguredVision),
            clock,
        )
    }
}
