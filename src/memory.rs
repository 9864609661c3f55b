use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::clock::{Clock, SystemClock};
use crate::diary::repo::DiaryRepository;
use crate::diary::repo_types::{Micros, NewRecord, NutritionRecord};
use crate::profiles::repo::ProfileRepository;
use crate::profiles::UserProfile;

/// Process-local store backing both repositories. Used when no database is
/// configured and throughout the tests. Row timestamps come from `clock`, the
/// same one the services read.
pub struct MemoryStore {
    profiles: DashMap<i64, UserProfile>,
    records: DashMap<i64, NutritionRecord>,
    next_id: AtomicI64,
    failing: AtomicBool,
    failing_reads: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            profiles: DashMap::new(),
            records: DashMap::new(),
            next_id: AtomicI64::new(0),
            failing: AtomicBool::new(false),
            failing_reads: AtomicBool::new(false),
            clock,
        }
    }

    /// Makes every write fail with a storage error until switched off.
    #[cfg(test)]
    pub fn fail_writes(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    /// Makes diary range reads fail until switched off.
    #[cfg(test)]
    pub fn fail_reads(&self, on: bool) {
        self.failing_reads.store(on, Ordering::SeqCst);
    }

    pub fn profile(&self, user_id: i64) -> Option<UserProfile> {
        self.profiles.get(&user_id).map(|p| p.value().clone())
    }

    #[cfg(test)]
    pub fn put_profile(&self, profile: UserProfile) {
        self.profiles.insert(profile.user_id, profile);
    }

    fn check_writable(&self) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("memory store is refusing writes");
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for MemoryStore {
    async fn find(&self, user_id: i64) -> anyhow::Result<Option<UserProfile>> {
        Ok(self.profile(user_id))
    }

    async fn insert_default(
        &self,
        user_id: i64,
        timezone_code: &str,
    ) -> anyhow::Result<UserProfile> {
        self.check_writable()?;
        let entry = self.profiles.entry(user_id).or_insert_with(|| {
            let mut p = UserProfile::new_default(user_id, self.clock.now_utc());
            p.timezone_code = timezone_code.to_string();
            p
        });
        Ok(entry.value().clone())
    }

    async fn save(&self, profile: &UserProfile) -> anyhow::Result<UserProfile> {
        self.check_writable()?;
        let mut stored = self
            .profiles
            .get_mut(&profile.user_id)
            .ok_or_else(|| anyhow::anyhow!("profile {} does not exist", profile.user_id))?;
        let created_at = stored.created_at;
        *stored = UserProfile {
            created_at,
            updated_at: self.clock.now_utc(),
            ..profile.clone()
        };
        Ok(stored.value().clone())
    }
}

#[async_trait]
impl DiaryRepository for MemoryStore {
    async fn insert(&self, r: NewRecord) -> anyhow::Result<NutritionRecord> {
        self.check_writable()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = NutritionRecord {
            id,
            owner_id: r.owner_id,
            food_name: r.fields.food_name,
            calories: r.fields.calories,
            protein_g: r.fields.protein_g,
            fat_g: r.fields.fat_g,
            carbs_g: r.fields.carbs_g,
            fiber_g: r.fields.micros.fiber_g,
            sugar_g: r.fields.micros.sugar_g,
            sodium_mg: r.fields.micros.sodium_mg,
            cholesterol_mg: r.fields.micros.cholesterol_mg,
            recorded_at: r.recorded_at,
        };
        self.records.insert(id, record.clone());
        Ok(record)
    }

    async fn list_between(
        &self,
        owner_id: i64,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> anyhow::Result<Vec<NutritionRecord>> {
        if self.failing_reads.load(Ordering::SeqCst) {
            bail!("memory store is refusing reads");
        }
        let mut rows: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.owner_id == owner_id && r.recorded_at >= from && r.recorded_at < to)
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn delete_owned(&self, owner_id: i64, id: i64) -> anyhow::Result<bool> {
        self.check_writable()?;
        Ok(self
            .records
            .remove_if(&id, |_, r| r.owner_id == owner_id)
            .is_some())
    }

    async fn update_micros_owned(
        &self,
        owner_id: i64,
        id: i64,
        micros: Micros,
    ) -> anyhow::Result<bool> {
        self.check_writable()?;
        match self.records.get_mut(&id) {
            Some(mut r) if r.owner_id == owner_id => {
                r.fiber_g = micros.fiber_g;
                r.sugar_g = micros.sugar_g;
                r.sodium_mg = micros.sodium_mg;
                r.cholesterol_mg = micros.cholesterol_mg;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
