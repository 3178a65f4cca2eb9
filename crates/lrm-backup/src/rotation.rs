//! Retention decisions for a tracked file's version history.
//!
//! A [`RotationPolicy`] only decides; deleting the versions it names is the
//! caller's job.

use crate::config::{BackupConfig, RetentionConfig};
use crate::version::BackupVersion;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use std::collections::HashSet;

/// Age tiers of a grandfather-father-son scheme.
///
/// Each tier starts where the previous one ends: everything is kept for
/// `keep_all_for_hours`, then one version per day for `keep_daily_for_days`,
/// one per ISO week for `keep_weekly_for_weeks`, and one per calendar month
/// for `keep_monthly_for_months`. Anything older is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionTiers {
    pub keep_all_for_hours: u32,
    pub keep_daily_for_days: u32,
    pub keep_weekly_for_weeks: u32,
    pub keep_monthly_for_months: u32,
}

impl From<&RetentionConfig> for RetentionTiers {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            keep_all_for_hours: config.keep_all_for_hours,
            keep_daily_for_days: config.keep_daily_for_days,
            keep_weekly_for_weeks: config.keep_weekly_for_weeks,
            keep_monthly_for_months: config.keep_monthly_for_months,
        }
    }
}

/// Tier boundaries resolved against a reference time.
struct Cutoffs {
    all: DateTime<Utc>,
    daily: DateTime<Utc>,
    weekly: DateTime<Utc>,
    monthly: DateTime<Utc>,
}

impl RetentionTiers {
    fn cutoffs(&self, now: DateTime<Utc>) -> Cutoffs {
        let all = reach_back(now, Duration::try_hours(i64::from(self.keep_all_for_hours)));
        let daily = reach_back(all, Duration::try_days(i64::from(self.keep_daily_for_days)));
        let weekly = reach_back(
            daily,
            Duration::try_weeks(i64::from(self.keep_weekly_for_weeks)),
        );
        let monthly = weekly
            .checked_sub_months(Months::new(self.keep_monthly_for_months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Cutoffs {
            all,
            daily,
            weekly,
            monthly,
        }
    }
}

/// `from - span`, saturating at the earliest representable instant.
fn reach_back(from: DateTime<Utc>, span: Option<Duration>) -> DateTime<Utc> {
    span.and_then(|span| from.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Decides which versions survive after a backup.
///
/// A flat cap is a policy with no tiers and only `max_total_backups`.
/// The highest version number always survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub tiers: Option<RetentionTiers>,
    pub max_total_backups: Option<usize>,
}

impl RotationPolicy {
    /// Keep only the `max_versions` most recent versions.
    pub fn flat(max_versions: usize) -> Self {
        Self {
            tiers: None,
            max_total_backups: Some(max_versions),
        }
    }

    /// Tiered retention with an overall cap.
    pub fn tiered(tiers: RetentionTiers, max_total_backups: usize) -> Self {
        Self {
            tiers: Some(tiers),
            max_total_backups: Some(max_total_backups),
        }
    }

    /// The policy a configuration selects.
    pub fn from_config(config: &BackupConfig) -> Self {
        match &config.retention {
            Some(retention) => Self::tiered(retention.into(), retention.max_total_backups),
            None => Self::flat(config.max_versions),
        }
    }

    /// Version numbers to delete, ascending.
    ///
    /// `versions` may be in any order. Timestamps later than `now` count as
    /// brand new.
    pub fn select_for_deletion(&self, versions: &[BackupVersion], now: DateTime<Utc>) -> Vec<u32> {
        let newest = match versions.iter().map(|v| v.version).max() {
            Some(newest) => newest,
            None => return Vec::new(),
        };

        // Most recent first, so each bucket keeps its latest member.
        let mut ordered: Vec<&BackupVersion> = versions.iter().collect();
        ordered.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.version.cmp(&a.version))
        });

        let mut survivors: Vec<u32> = match &self.tiers {
            Some(tiers) => thin_by_tiers(tiers, &ordered, now),
            None => ordered.iter().map(|v| v.version).collect(),
        };
        if !survivors.contains(&newest) {
            survivors.push(newest);
        }

        if let Some(max) = self.max_total_backups {
            survivors.sort_unstable_by(|a, b| b.cmp(a));
            survivors.truncate(max.max(1));
        }

        let keep: HashSet<u32> = survivors.into_iter().collect();
        let mut doomed: Vec<u32> = versions
            .iter()
            .map(|v| v.version)
            .filter(|v| !keep.contains(v))
            .collect();
        doomed.sort_unstable();
        doomed.dedup();
        doomed
    }
}

fn thin_by_tiers(tiers: &RetentionTiers, ordered: &[&BackupVersion], now: DateTime<Utc>) -> Vec<u32> {
    let cutoffs = tiers.cutoffs(now);
    let mut days: HashSet<NaiveDate> = HashSet::new();
    let mut weeks: HashSet<(i32, u32)> = HashSet::new();
    let mut months: HashSet<(i32, u32)> = HashSet::new();

    ordered
        .iter()
        .filter(|v| {
            let ts = v.timestamp;
            if ts >= cutoffs.all {
                true
            } else if ts >= cutoffs.daily {
                days.insert(ts.date_naive())
            } else if ts >= cutoffs.weekly {
                let week = ts.iso_week();
                weeks.insert((week.year(), week.week()))
            } else if ts >= cutoffs.monthly {
                months.insert((ts.year(), ts.month()))
            } else {
                false
            }
        })
        .map(|v| v.version)
        .collect()
}
