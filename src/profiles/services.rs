use std::sync::Arc;

use dashmap::DashMap;
use time::{Date, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::error::DiaryError;
use crate::profiles::repo::ProfileRepository;
use crate::profiles::repo_types::{MacroLimits, UserProfile};
use crate::timezones::{self, DEFAULT_TIMEZONE_CODE};

/// Profile access with a read-through cache keyed by user id. Cache entries
/// only ever hold rows the store returned, so a failed write cannot leave the
/// cache ahead of the database.
///
/// Writes replace the whole row, so every load-modify-save of one user runs
/// under that user's write lock, whichever surface (chat or HTTP) issued it.
pub struct ProfileService {
    repo: Arc<dyn ProfileRepository>,
    clock: Arc<dyn Clock>,
    cache: DashMap<i64, UserProfile>,
    writers: DashMap<i64, Arc<Mutex<()>>>,
}

impl ProfileService {
    pub fn new(repo: Arc<dyn ProfileRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            cache: DashMap::new(),
            writers: DashMap::new(),
        }
    }

    fn writer(&self, user_id: i64) -> Arc<Mutex<()>> {
        self.writers.entry(user_id).or_default().value().clone()
    }

    pub fn now_utc(&self) -> OffsetDateTime {
        self.clock.now_utc()
    }

    pub fn current_datetime(&self, profile: &UserProfile) -> OffsetDateTime {
        profile.current_datetime(self.clock.now_utc())
    }

    pub fn current_date(&self, profile: &UserProfile) -> Date {
        profile.current_date(self.clock.now_utc())
    }

    pub async fn today(&self, user_id: i64) -> Result<Date, DiaryError> {
        let profile = self.load(user_id).await?;
        Ok(self.current_date(&profile))
    }

    /// Loads (or lazily creates) the profile. A stored timezone code that is
    /// no longer known is reset to the default and persisted.
    #[instrument(skip(self))]
    pub async fn load(&self, user_id: i64) -> Result<UserProfile, DiaryError> {
        if let Some(cached) = self.cached(user_id) {
            return Ok(cached);
        }
        let writer = self.writer(user_id);
        let _guard = writer.lock().await;
        self.load_locked(user_id).await
    }

    fn cached(&self, user_id: i64) -> Option<UserProfile> {
        self.cache.get(&user_id).map(|p| p.value().clone())
    }

    /// Caller holds the user's write lock.
    async fn load_locked(&self, user_id: i64) -> Result<UserProfile, DiaryError> {
        if let Some(cached) = self.cached(user_id) {
            return Ok(cached);
        }

        let mut profile = match self.repo.find(user_id).await? {
            Some(p) => p,
            None => {
                let p = self
                    .repo
                    .insert_default(user_id, DEFAULT_TIMEZONE_CODE)
                    .await?;
                info!(user_id, "profile created");
                p
            }
        };

        if !timezones::is_known(&profile.timezone_code) {
            warn!(
                user_id,
                code = %profile.timezone_code,
                "unknown timezone code on profile; resetting to default"
            );
            profile.timezone_code = DEFAULT_TIMEZONE_CODE.to_string();
            profile = self.repo.save(&profile).await?;
        }

        self.cache.insert(user_id, profile.clone());
        Ok(profile)
    }

    #[instrument(skip(self))]
    pub async fn set_timezone(&self, user_id: i64, code: &str) -> Result<UserProfile, DiaryError> {
        let code = code.trim().to_uppercase();
        if !timezones::is_known(&code) {
            return Err(DiaryError::InvalidTimezone(code));
        }
        let writer = self.writer(user_id);
        let _guard = writer.lock().await;
        let mut profile = self.load_locked(user_id).await?;
        profile.timezone_code = code;
        self.persist(profile).await
    }

    /// Non-positive limits are ignored and the current profile is returned.
    #[instrument(skip(self))]
    pub async fn set_calorie_limit(
        &self,
        user_id: i64,
        limit: i32,
    ) -> Result<UserProfile, DiaryError> {
        let writer = self.writer(user_id);
        let _guard = writer.lock().await;
        let mut profile = self.load_locked(user_id).await?;
        if limit <= 0 {
            debug!(user_id, limit, "ignoring non-positive calorie limit");
            return Ok(profile);
        }
        profile.calorie_limit = Some(limit);
        self.persist(profile).await
    }

    #[instrument(skip(self))]
    pub async fn set_macro_limits(
        &self,
        user_id: i64,
        limits: MacroLimits,
    ) -> Result<UserProfile, DiaryError> {
        let writer = self.writer(user_id);
        let _guard = writer.lock().await;
        let mut profile = self.load_locked(user_id).await?;
        profile.apply_macro_limits(limits)?;
        self.persist(profile).await
    }

    #[instrument(skip(self))]
    pub async fn set_body_metrics(
        &self,
        user_id: i64,
        weight_kg: f64,
        body_fat_percent: f64,
    ) -> Result<UserProfile, DiaryError> {
        let writer = self.writer(user_id);
        let _guard = writer.lock().await;
        let mut profile = self.load_locked(user_id).await?;
        profile.apply_body_metrics(weight_kg, body_fat_percent)?;
        self.persist(profile).await
    }

    /// Caller holds the user's write lock.
    async fn persist(&self, profile: UserProfile) -> Result<UserProfile, DiaryError> {
        let saved = self.repo.save(&profile).await?;
        self.cache.insert(saved.user_id, saved.clone());
        debug!(user_id = saved.user_id, "profile saved");
        Ok(saved)
    }
}

#[cfg(test)]
mod profile_service_tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::MemoryStore;
    use time::macros::{date, datetime};

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(datetime!(2024-03-01 21:30 UTC)))
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new(clock()))
    }

    fn service(store: Arc<MemoryStore>) -> ProfileService {
        ProfileService::new(store, clock())
    }

    #[tokio::test]
    async fn first_load_creates_default_profile() {
        let store = store();
        let svc = service(store.clone());
        let p = svc.load(42).await.unwrap();
        assert_eq!(p.timezone_code, DEFAULT_TIMEZONE_CODE);
        assert_eq!(p.calorie_limit, None);
        assert!(store.profile(42).is_some());
        // Moscow is UTC+3, so 21:30 UTC is already the next day
        assert_eq!(svc.current_date(&p), date!(2024-03-02));
    }

    #[tokio::test]
    async fn unknown_timezone_self_heals_on_load() {
        let store = store();
        let mut stale = UserProfile::new_default(7, datetime!(2024-01-01 00:00 UTC));
        stale.timezone_code = "ATLANTIS".into();
        store.put_profile(stale);

        let svc = service(store.clone());
        let p = svc.load(7).await.unwrap();
        assert_eq!(p.timezone_code, DEFAULT_TIMEZONE_CODE);
        assert_eq!(store.profile(7).unwrap().timezone_code, DEFAULT_TIMEZONE_CODE);
    }

    #[tokio::test]
    async fn set_timezone_rejects_unknown_code() {
        let svc = service(store());
        let err = svc.set_timezone(1, "XYZ").await.unwrap_err();
        assert!(matches!(err, DiaryError::InvalidTimezone(_)));
        let p = svc.set_timezone(1, "vlad").await.unwrap();
        assert_eq!(p.timezone_code, "VLAD");
    }

    #[tokio::test]
    async fn non_positive_calorie_limit_is_ignored() {
        let svc = service(store());
        svc.set_calorie_limit(1, 1800).await.unwrap();
        let p = svc.set_calorie_limit(1, 0).await.unwrap();
        assert_eq!(p.calorie_limit, Some(1800));
        let p = svc.set_calorie_limit(1, -5).await.unwrap();
        assert_eq!(p.calorie_limit, Some(1800));
    }

    #[tokio::test]
    async fn macro_limits_supersede_manual_calorie_limit() {
        let svc = service(store());
        svc.set_calorie_limit(1, 1500).await.unwrap();
        let p = svc
            .set_macro_limits(
                1,
                MacroLimits {
                    protein: 120.0,
                    fat: 70.0,
                    carbs: 300.0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(p.calorie_limit, Some(2310));
    }

    #[tokio::test]
    async fn failed_write_leaves_cache_untouched() {
        let store = store();
        let svc = service(store.clone());
        svc.set_calorie_limit(1, 2000).await.unwrap();

        store.fail_writes(true);
        let err = svc.set_calorie_limit(1, 2500).await.unwrap_err();
        assert!(matches!(err, DiaryError::Persistence(_)));
        store.fail_writes(false);

        assert_eq!(svc.load(1).await.unwrap().calorie_limit, Some(2000));
        assert_eq!(store.profile(1).unwrap().calorie_limit, Some(2000));
    }

    #[tokio::test]
    async fn invalid_body_metrics_do_not_persist() {
        let store = store();
        let svc = service(store.clone());
        let err = svc.set_body_metrics(1, 80.0, 140.0).await.unwrap_err();
        assert!(matches!(err, DiaryError::Validation(_)));
        assert_eq!(store.profile(1).unwrap().weight_kg, None);

        let p = svc.set_body_metrics(1, 80.0, 20.0).await.unwrap();
        assert_eq!(p.weight_kg, Some(80.0));
        assert!(p.calorie_limit.is_some());
    }

    /// Yields inside `save` so concurrent writers interleave the way they do
    /// against a real database.
    struct SlowSaves(Arc<MemoryStore>);

    #[async_trait::async_trait]
    impl ProfileRepository for SlowSaves {
        async fn find(&self, user_id: i64) -> anyhow::Result<Option<UserProfile>> {
            self.0.find(user_id).await
        }

        async fn insert_default(
            &self,
            user_id: i64,
            timezone_code: &str,
        ) -> anyhow::Result<UserProfile> {
            self.0.insert_default(user_id, timezone_code).await
        }

        async fn save(&self, profile: &UserProfile) -> anyhow::Result<UserProfile> {
            tokio::task::yield_now().await;
            self.0.save(profile).await
        }
    }

    #[tokio::test]
    async fn concurrent_writes_to_one_profile_are_not_lost() {
        let store = store();
        let svc = ProfileService::new(Arc::new(SlowSaves(store.clone())), clock());
        svc.load(1).await.unwrap();

        let (tz, limit) = tokio::join!(svc.set_timezone(1, "VLAD"), svc.set_calorie_limit(1, 1800));
        tz.unwrap();
        limit.unwrap();

        let stored = store.profile(1).unwrap();
        assert_eq!(stored.timezone_code, "VLAD");
        assert_eq!(stored.calorie_limit, Some(1800));
        assert_eq!(svc.load(1).await.unwrap(), stored);
    }
}
