use std::cmp::Reverse;
use std::sync::Arc;

use time::{Date, Duration};
use tracing::{debug, info, instrument};

use crate::diary::repo::DiaryRepository;
use crate::diary::repo_types::{Micros, NewRecord, NutrientFields, NutritionRecord};
use crate::error::DiaryError;
use crate::profiles::{services::ProfileService, UserProfile};

pub struct DiaryService {
    repo: Arc<dyn DiaryRepository>,
    profiles: Arc<ProfileService>,
}

impl DiaryService {
    pub fn new(repo: Arc<dyn DiaryRepository>, profiles: Arc<ProfileService>) -> Self {
        Self { repo, profiles }
    }

    /// Records a confirmed entry stamped with the owner's current local time.
    #[instrument(skip(self, fields), fields(food = %fields.food_name))]
    pub async fn append(
        &self,
        owner_id: i64,
        fields: NutrientFields,
    ) -> Result<NutritionRecord, DiaryError> {
        fields.validate()?;
        let profile = self.profiles.load(owner_id).await?;
        let record = self
            .repo
            .insert(NewRecord {
                owner_id,
                fields,
                recorded_at: self.profiles.current_datetime(&profile),
            })
            .await?;
        info!(owner_id, id = record.id, calories = record.calories, "entry recorded");
        Ok(record)
    }

    /// Entries whose local date (owner's zone) is `date`, newest first.
    pub async fn records_on_date(
        &self,
        owner_id: i64,
        date: Date,
    ) -> Result<Vec<NutritionRecord>, DiaryError> {
        let profile = self.profiles.load(owner_id).await?;
        self.records_for_profile(&profile, date).await
    }

    pub async fn records_for_profile(
        &self,
        profile: &UserProfile,
        date: Date,
    ) -> Result<Vec<NutritionRecord>, DiaryError> {
        // Every zone offset lies within ±1 day of UTC, so this window always
        // contains the local day; the exact cut happens below.
        let from = date.previous_day().unwrap_or(date).midnight().assume_utc();
        let to = date
            .next_day()
            .and_then(Date::next_day)
            .unwrap_or(date)
            .midnight()
            .assume_utc();

        let zone = profile.zone();
        let mut records: Vec<_> = self
            .repo
            .list_between(profile.user_id, from, to)
            .await?
            .into_iter()
            .filter(|r| r.local_date(zone) == date)
            .collect();
        records.sort_by_key(|r| (Reverse(r.recorded_at), Reverse(r.id)));
        Ok(records)
    }

    #[instrument(skip(self))]
    pub async fn delete_by_id(&self, owner_id: i64, id: i64) -> Result<bool, DiaryError> {
        let deleted = self.repo.delete_owned(owner_id, id).await?;
        if deleted {
            info!(owner_id, id, "entry deleted");
        } else {
            debug!(owner_id, id, "no such entry for owner");
        }
        Ok(deleted)
    }

    /// `index` counts into the same newest-first listing `records_on_date`
    /// returns for `date`.
    #[instrument(skip(self))]
    pub async fn delete_by_display_index(
        &self,
        owner_id: i64,
        date: Date,
        index: usize,
    ) -> Result<bool, DiaryError> {
        let records = self.records_on_date(owner_id, date).await?;
        match records.get(index) {
            Some(record) => self.delete_by_id(owner_id, record.id).await,
            None => {
                debug!(owner_id, index, len = records.len(), "display index out of range");
                Ok(false)
            }
        }
    }

    /// `n` consecutive dates ending with the owner's today, newest first.
    pub async fn last_n_dates(&self, owner_id: i64, n: usize) -> Result<Vec<Date>, DiaryError> {
        let today = self.profiles.today(owner_id).await?;
        Ok((0..n as i64)
            .filter_map(|i| today.checked_sub(Duration::days(i)))
            .collect())
    }

    /// Fills in micro nutrients that arrived after the entry was recorded.
    #[instrument(skip(self))]
    pub async fn backfill_micros(
        &self,
        owner_id: i64,
        id: i64,
        micros: Micros,
    ) -> Result<bool, DiaryError> {
        micros.validate()?;
        Ok(self.repo.update_micros_owned(owner_id, id, micros).await?)
    }
}

#[cfg(test)]
mod diary_tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::MemoryStore;
    use time::macros::{date, datetime};
    use time::OffsetDateTime;

    struct Fixture {
        clock: Arc<FixedClock>,
        profiles: Arc<ProfileService>,
        diary: DiaryService,
        store: Arc<MemoryStore>,
    }

    fn fixture(now: OffsetDateTime) -> Fixture {
        let clock = Arc::new(FixedClock::new(now));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let profiles = Arc::new(ProfileService::new(store.clone(), clock.clone()));
        let diary = DiaryService::new(store.clone(), profiles.clone());
        Fixture {
            clock,
            profiles,
            diary,
            store,
        }
    }

    fn meal(name: &str, kcal: f64) -> NutrientFields {
        NutrientFields {
            food_name: name.into(),
            calories: kcal,
            protein_g: 10.0,
            fat_g: 5.0,
            carbs_g: 20.0,
            micros: Micros::default(),
        }
    }

    #[tokio::test]
    async fn late_evening_moscow_entry_stays_on_local_date() {
        // 23:50 Moscow on 2024-03-01 is 20:50 UTC
        let f = fixture(datetime!(2024-03-01 20:50 UTC));
        let rec = f.diary.append(1, meal("Kefir", 120.0)).await.unwrap();
        assert_eq!(rec.recorded_at.offset().whole_hours(), 3);

        let on_day = f.diary.records_on_date(1, date!(2024-03-01)).await.unwrap();
        assert_eq!(on_day.len(), 1);
        assert!(f.diary.records_on_date(1, date!(2024-03-02)).await.unwrap().is_empty());
        assert!(f.diary.records_on_date(1, date!(2024-02-29)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn vladivostok_entry_is_not_bucketed_by_utc_date() {
        // 23:58 in UTC+10 is 13:58 UTC of the same calendar day
        let f = fixture(datetime!(2024-03-01 13:58 UTC));
        f.profiles.set_timezone(5, "VLAD").await.unwrap();
        f.diary.append(5, meal("Ramen", 600.0)).await.unwrap();
        assert_eq!(f.diary.records_on_date(5, date!(2024-03-01)).await.unwrap().len(), 1);

        // 00:30 local on the next day is still 2024-03-01 in UTC
        f.clock.set(datetime!(2024-03-01 14:30 UTC));
        f.diary.append(5, meal("Tea", 5.0)).await.unwrap();
        let next = f.diary.records_on_date(5, date!(2024-03-02)).await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].food_name, "Tea");
        assert_eq!(f.diary.records_on_date(5, date!(2024-03-01)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn every_local_minute_of_a_day_buckets_to_that_day() {
        let f = fixture(datetime!(2024-06-10 00:00 UTC));
        f.profiles.set_timezone(9, "PET").await.unwrap();
        // Kamchatka is UTC+12: local 2024-06-10 runs 06-09 12:00 .. 06-10 12:00 UTC
        let start = datetime!(2024-06-09 12:00 UTC);
        for minutes in [0, 1, 359, 720, 1439] {
            f.clock.set(start + Duration::minutes(minutes));
            f.diary.append(9, meal("Snack", 1.0)).await.unwrap();
        }
        assert_eq!(f.diary.records_on_date(9, date!(2024-06-10)).await.unwrap().len(), 5);
        assert!(f.diary.records_on_date(9, date!(2024-06-09)).await.unwrap().is_empty());
        assert!(f.diary.records_on_date(9, date!(2024-06-11)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_is_newest_first_with_stable_ties() {
        let f = fixture(datetime!(2024-03-01 09:00 UTC));
        let first = f.diary.append(1, meal("Porridge", 300.0)).await.unwrap();
        let same_instant = f.diary.append(1, meal("Coffee", 10.0)).await.unwrap();
        f.clock.advance(Duration::hours(3));
        let later = f.diary.append(1, meal("Soup", 250.0)).await.unwrap();

        let ids: Vec<_> = f
            .diary
            .records_on_date(1, date!(2024-03-01))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![later.id, same_instant.id, first.id]);
    }

    #[tokio::test]
    async fn delete_by_index_removes_what_listing_shows_at_that_index() {
        let f = fixture(datetime!(2024-03-01 09:00 UTC));
        for (i, name) in ["A", "B", "C"].into_iter().enumerate() {
            f.clock.set(datetime!(2024-03-01 09:00 UTC) + Duration::minutes(i as i64));
            f.diary.append(1, meal(name, 100.0)).await.unwrap();
        }
        let day = date!(2024-03-01);
        let shown_first = f.diary.records_on_date(1, day).await.unwrap()[0].clone();
        assert!(f.diary.delete_by_display_index(1, day, 0).await.unwrap());
        let rest = f.diary.records_on_date(1, day).await.unwrap();
        assert!(rest.iter().all(|r| r.id != shown_first.id));
        assert_eq!(rest.len(), 2);

        assert!(!f.diary.delete_by_display_index(1, day, 2).await.unwrap());
        assert_eq!(f.diary.records_on_date(1, day).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_by_id_checks_ownership() {
        let f = fixture(datetime!(2024-03-01 09:00 UTC));
        let rec = f.diary.append(1, meal("Cake", 400.0)).await.unwrap();
        assert!(!f.diary.delete_by_id(2, rec.id).await.unwrap());
        assert!(!f.diary.delete_by_id(1, rec.id + 100).await.unwrap());
        assert!(f.diary.delete_by_id(1, rec.id).await.unwrap());
        assert!(!f.diary.delete_by_id(1, rec.id).await.unwrap());
    }

    #[tokio::test]
    async fn last_n_dates_ends_at_local_today() {
        // 22:00 UTC is already 2024-03-02 in Moscow
        let f = fixture(datetime!(2024-03-01 22:00 UTC));
        let dates = f.diary.last_n_dates(1, 3).await.unwrap();
        assert_eq!(dates, vec![date!(2024-03-02), date!(2024-03-01), date!(2024-02-29)]);
    }

    #[tokio::test]
    async fn backfill_only_touches_micros_of_own_entry() {
        let f = fixture(datetime!(2024-03-01 09:00 UTC));
        let rec = f.diary.append(1, meal("Salad", 150.0)).await.unwrap();
        let micros = Micros {
            fiber_g: 6.0,
            sugar_g: 3.0,
            sodium_mg: 200.0,
            cholesterol_mg: 0.0,
        };
        assert!(!f.diary.backfill_micros(2, rec.id, micros).await.unwrap());
        assert!(f.diary.backfill_micros(1, rec.id, micros).await.unwrap());

        let stored = f.diary.records_on_date(1, date!(2024-03-01)).await.unwrap();
        assert_eq!(stored[0].micros(), micros);
        assert_eq!(stored[0].calories, rec.calories);
        assert_eq!(stored[0].recorded_at, rec.recorded_at);
    }

    #[tokio::test]
    async fn failed_insert_leaves_no_entry() {
        let f = fixture(datetime!(2024-03-01 09:00 UTC));
        f.profiles.load(1).await.unwrap();
        f.store.fail_writes(true);
        let err = f.diary.append(1, meal("Pizza", 800.0)).await.unwrap_err();
        assert!(matches!(err, DiaryError::Persistence(_)));
        f.store.fail_writes(false);
        assert!(f.diary.records_on_date(1, date!(2024-03-01)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_rejects_negative_quantities() {
        let f = fixture(datetime!(2024-03-01 09:00 UTC));
        let mut bad = meal("Mystery", 100.0);
        bad.fat_g = -3.0;
        assert!(matches!(
            f.diary.append(1, bad).await,
            Err(DiaryError::Validation(_))
        ));
    }
}
