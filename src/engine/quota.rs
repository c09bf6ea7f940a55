//! Remote-usage quota.
//!
//! Counters persist outside this crate (the host stores them between runs);
//! the engine reads, rolls over, and increments them. Rollover is lazy:
//! each check first expires any window whose reset instant has passed.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::QuotaPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub daily_count: u32,
    pub daily_reset_at: DateTime<Utc>,
    pub monthly_count: u32,
    pub monthly_reset_at: DateTime<Utc>,
}

impl QuotaState {
    /// Fresh counters with windows anchored at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            daily_count: 0,
            daily_reset_at: next_midnight(now),
            monthly_count: 0,
            monthly_reset_at: next_month_start(now),
        }
    }

    /// Expire any window whose reset instant has passed.
    pub fn rollover(&mut self, now: DateTime<Utc>) {
        if now >= self.daily_reset_at {
            self.daily_count = 0;
            self.daily_reset_at = next_midnight(now);
        }
        if now >= self.monthly_reset_at {
            self.monthly_count = 0;
            self.monthly_reset_at = next_month_start(now);
        }
    }

    pub fn can_spend(&self, policy: &QuotaPolicy) -> bool {
        self.daily_count < policy.daily_cap && self.monthly_count < policy.monthly_cap
    }

    /// Charge one remote fetch. Callers guarantee idempotence per
    /// fingerprint; this just counts.
    pub fn record(&mut self) {
        self.daily_count = self.daily_count.saturating_add(1);
        self.monthly_count = self.monthly_count.saturating_add(1);
    }

    pub fn remaining_daily(&self, policy: &QuotaPolicy) -> u32 {
        policy.daily_cap.saturating_sub(self.daily_count)
    }

    /// Which cap is in the way, for the caller-facing `limit_reason`.
    pub fn limit_reason(&self, policy: &QuotaPolicy) -> Option<String> {
        if self.daily_count >= policy.daily_cap {
            Some(format!(
                "daily enrichment limit reached ({}/{})",
                self.daily_count, policy.daily_cap
            ))
        } else if self.monthly_count >= policy.monthly_cap {
            Some(format!(
                "monthly enrichment limit reached ({}/{})",
                self.monthly_count, policy.monthly_cap
            ))
        } else {
            None
        }
    }
}

fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .unwrap_or(now.date_naive());
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).expect("midnight is valid"))
}

fn next_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let date = now.date_naive();
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is valid");
    Utc.from_utc_datetime(&first.and_hms_opt(0, 0, 0).expect("midnight is valid"))
}
