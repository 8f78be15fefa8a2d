//! # Shipping schedule
//!
//! Boxes leave the bakery once a week, on Wednesday. Each week has a fixed
//! number of shipping slots (`MAX_BOXES_PER_WEEK`), tracked as a per-week
//! counter keyed by the ISO date of that Wednesday.
//!
//! Two operations live here:
//! - [`resolve_ship_date`]: pure calendar math. Finds the next Wednesday at or
//!   after a start date, skipping the configured closure period and pushing
//!   same-day orders placed after the cutoff hour to the following week.
//! - [`find_available_week`] / [`reserve_week`]: walk forward week by week
//!   until one has room for the requested boxes. The read-only variant quotes
//!   a week to the customer; the reserving variant is used by the payment
//!   webhook and claims the slots through the store's atomic conditional
//!   increment, so two concurrent confirmations cannot jointly overbook a
//!   week.
//!
//! Both walks are bounded. The original behavior recursed on closure
//! adjustment and looped forever when no week had room; here a malformed
//! closure surfaces as [`ShipDateError::ClosureLoop`] and a full calendar as
//! `AppError::CapacityExhausted`.
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::{config::Config, database::CapacityStore, error::AppError};

/// Date range (inclusive on both ends) during which nothing ships.
#[derive(Debug, Clone, Deserialize)]
pub struct ClosurePeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ClosurePeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Error, Debug)]
pub enum ShipDateError {
    #[error("closure adjustment did not settle after {MAX_CLOSURE_PASSES} passes")]
    ClosureLoop,
}

const MAX_CLOSURE_PASSES: u32 = 8;

/// How far ahead the capacity walk will look before giving up.
const MAX_WEEKS_SCANNED: u32 = 52;

/// Next Wednesday at or after `now + weeks_to_add` weeks.
///
/// If the candidate is today and the clock is already past the cutoff hour,
/// the order can no longer make this week's run and moves one week out. A
/// candidate inside the closure period restarts the search from the day after
/// the closure ends.
pub fn resolve_ship_date(
    now: NaiveDateTime,
    weeks_to_add: u32,
    closure: Option<&ClosurePeriod>,
    cutoff_hour: u32,
) -> Result<NaiveDate, ShipDateError> {
    let mut search_start = now.date() + Duration::weeks(weeks_to_add as i64);

    for _ in 0..MAX_CLOSURE_PASSES {
        let until_wednesday = (7 + Weekday::Wed.num_days_from_sunday() as i64
            - search_start.weekday().num_days_from_sunday() as i64)
            % 7;
        let mut candidate = search_start + Duration::days(until_wednesday);

        if candidate == now.date() && now.hour() >= cutoff_hour {
            candidate += Duration::weeks(1);
        }

        match closure {
            Some(period) if period.contains(candidate) => {
                search_start = period.end + Duration::days(1);
            }
            _ => return Ok(candidate),
        }
    }

    Err(ShipDateError::ClosureLoop)
}

pub struct ShippingQuote {
    pub ship_date: NaiveDate,
    pub remaining_slots: u32,
}

/// Read-only capacity search: the first week that can take `boxes` more.
///
/// Idempotent for a fixed store state, so repeated quotes for the same cart
/// land on the same week.
pub async fn find_available_week(
    store: &dyn CapacityStore,
    now: NaiveDateTime,
    boxes: u32,
    config: &Config,
) -> Result<ShippingQuote, AppError> {
    for skipped in 0..MAX_WEEKS_SCANNED {
        let week = resolve_ship_date(now, skipped, config.closure.as_ref(), config.cutoff_hour)?;
        let booked = store.boxes_ordered(week).await?;

        if booked + boxes <= config.max_boxes_per_week {
            return Ok(ShippingQuote {
                ship_date: week,
                remaining_slots: config.max_boxes_per_week - booked,
            });
        }

        debug!("Week of {week} is full ({booked} booked), skipping ahead");
    }

    Err(AppError::CapacityExhausted)
}

/// Claim `boxes` slots in the first week that can take them.
///
/// Unlike [`find_available_week`] this does not read then write: each
/// candidate week is claimed through the store's conditional increment, which
/// either books the boxes or refuses atomically. A week that filled up between
/// the customer's quote and the payment confirmation is simply walked past.
pub async fn reserve_week(
    store: &dyn CapacityStore,
    now: NaiveDateTime,
    boxes: u32,
    config: &Config,
) -> Result<NaiveDate, AppError> {
    for skipped in 0..MAX_WEEKS_SCANNED {
        let week = resolve_ship_date(now, skipped, config.closure.as_ref(), config.cutoff_hour)?;

        if store
            .try_reserve(week, boxes, config.max_boxes_per_week)
            .await?
        {
            return Ok(week);
        }

        debug!("Week of {week} refused {boxes} more boxes, skipping ahead");
    }

    Err(AppError::CapacityExhausted)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;

    fn dt(y: i32, m: u32, d: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config(max_boxes: u32, closure: Option<ClosurePeriod>) -> Config {
        Config {
            port: 0,
            redis_url: String::new(),
            stripe_secret_key: String::new(),
            stripe_webhook_secret: String::new(),
            max_boxes_per_week: max_boxes,
            cutoff_hour: 12,
            shipping_fee: 9.90,
            closure,
            site_url: String::new(),
            catalog_path: String::new(),
        }
    }

    struct MemoryStore {
        booked: Mutex<HashMap<NaiveDate, u32>>,
        default_booked: u32,
    }

    impl MemoryStore {
        fn new(entries: &[(NaiveDate, u32)]) -> Self {
            Self {
                booked: Mutex::new(entries.iter().cloned().collect()),
                default_booked: 0,
            }
        }

        fn saturated(default_booked: u32) -> Self {
            Self {
                booked: Mutex::new(HashMap::new()),
                default_booked,
            }
        }
    }

    #[async_trait]
    impl CapacityStore for MemoryStore {
        async fn boxes_ordered(&self, week: NaiveDate) -> Result<u32, AppError> {
            let booked = self.booked.lock().await;

            Ok(booked.get(&week).copied().unwrap_or(self.default_booked))
        }

        async fn try_reserve(&self, week: NaiveDate, boxes: u32, max: u32) -> Result<bool, AppError> {
            let mut booked = self.booked.lock().await;
            let current = booked.entry(week).or_insert(self.default_booked);

            if *current + boxes > max {
                return Ok(false);
            }

            *current += boxes;
            Ok(true)
        }
    }

    // 2025-09-03 is a Wednesday.

    #[test]
    fn resolves_to_a_wednesday_on_or_after_start() {
        for day in 1..=14 {
            for weeks in 0..3 {
                let now = dt(2025, 9, day, 9, 0);
                let resolved = resolve_ship_date(now, weeks, None, 12).unwrap();

                assert_eq!(resolved.weekday(), Weekday::Wed);
                assert!(resolved >= now.date() + Duration::weeks(weeks as i64));
            }
        }
    }

    #[test]
    fn monday_resolves_to_same_week_wednesday() {
        let resolved = resolve_ship_date(dt(2025, 9, 1, 9, 0), 0, None, 12).unwrap();

        assert_eq!(resolved, date(2025, 9, 3));
    }

    #[test]
    fn wednesday_morning_ships_same_day() {
        let resolved = resolve_ship_date(dt(2025, 9, 3, 10, 0), 0, None, 12).unwrap();

        assert_eq!(resolved, date(2025, 9, 3));
    }

    #[test]
    fn wednesday_afternoon_ships_next_week() {
        let resolved = resolve_ship_date(dt(2025, 9, 3, 13, 0), 0, None, 12).unwrap();

        assert_eq!(resolved, date(2025, 9, 10));
    }

    #[test]
    fn cutoff_does_not_apply_to_future_weeks() {
        let resolved = resolve_ship_date(dt(2025, 9, 3, 13, 0), 1, None, 12).unwrap();

        assert_eq!(resolved, date(2025, 9, 10));
    }

    #[test]
    fn closure_pushes_past_its_end() {
        let closure = ClosurePeriod {
            start: date(2025, 8, 1),
            end: date(2025, 8, 31),
        };

        // Aug 15 is mid-closure; first Wednesday on or after Sep 1 is Sep 3.
        let resolved = resolve_ship_date(dt(2025, 8, 15, 9, 0), 0, Some(&closure), 12).unwrap();

        assert_eq!(resolved, date(2025, 9, 3));
        assert!(resolved >= closure.end + Duration::days(1));
    }

    #[test]
    fn closure_free_date_is_untouched_by_closure() {
        let closure = ClosurePeriod {
            start: date(2025, 8, 1),
            end: date(2025, 8, 31),
        };

        let resolved = resolve_ship_date(dt(2025, 9, 8, 9, 0), 0, Some(&closure), 12).unwrap();

        assert_eq!(resolved, date(2025, 9, 10));
    }

    #[tokio::test]
    async fn quotes_first_week_with_room() {
        let store = MemoryStore::new(&[(date(2025, 9, 3), 20)]);
        let quote = find_available_week(&store, dt(2025, 9, 1, 9, 0), 3, &config(25, None))
            .await
            .unwrap();

        assert_eq!(quote.ship_date, date(2025, 9, 3));
        assert_eq!(quote.remaining_slots, 5);
    }

    #[tokio::test]
    async fn full_week_resolves_to_following_week() {
        let store = MemoryStore::new(&[(date(2025, 9, 3), 25)]);
        let quote = find_available_week(&store, dt(2025, 9, 1, 9, 0), 1, &config(25, None))
            .await
            .unwrap();

        assert_eq!(quote.ship_date, date(2025, 9, 10));
        assert_eq!(quote.remaining_slots, 25);
    }

    #[tokio::test]
    async fn quote_is_idempotent_for_fixed_store_state() {
        let store = MemoryStore::new(&[(date(2025, 9, 3), 25), (date(2025, 9, 10), 24)]);
        let now = dt(2025, 9, 1, 9, 0);

        let first = find_available_week(&store, now, 1, &config(25, None))
            .await
            .unwrap();
        let second = find_available_week(&store, now, 1, &config(25, None))
            .await
            .unwrap();

        assert_eq!(first.ship_date, second.ship_date);
        assert_eq!(first.remaining_slots, second.remaining_slots);
    }

    #[tokio::test]
    async fn reservation_claims_quoted_week() {
        let store = MemoryStore::new(&[]);
        let now = dt(2025, 9, 1, 9, 0);

        let week = reserve_week(&store, now, 3, &config(25, None)).await.unwrap();

        assert_eq!(week, date(2025, 9, 3));
        assert_eq!(store.boxes_ordered(week).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn reservation_walks_past_full_week() {
        let store = MemoryStore::new(&[(date(2025, 9, 3), 24)]);
        let now = dt(2025, 9, 1, 9, 0);

        let week = reserve_week(&store, now, 2, &config(25, None)).await.unwrap();

        assert_eq!(week, date(2025, 9, 10));
        // The full week was refused, not partially filled.
        assert_eq!(store.boxes_ordered(date(2025, 9, 3)).await.unwrap(), 24);
        assert_eq!(store.boxes_ordered(week).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn exhausted_calendar_reports_no_capacity() {
        let store = MemoryStore::saturated(25);
        let now = dt(2025, 9, 1, 9, 0);

        let quote = find_available_week(&store, now, 1, &config(25, None)).await;
        let reserved = reserve_week(&store, now, 1, &config(25, None)).await;

        assert!(matches!(quote, Err(AppError::CapacityExhausted)));
        assert!(matches!(reserved, Err(AppError::CapacityExhausted)));
    }
}
