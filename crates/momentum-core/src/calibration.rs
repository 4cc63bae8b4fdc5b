//! Time-estimation calibration.
//!
//! Converts a raw time estimate into a calibrated one from the user's
//! current state: energy level, medication peak window, and time of day.
//! Everything here is a pure function of its inputs -- no clock reads and
//! no I/O -- so the math is trivially testable.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::DatabaseError;
use crate::storage::Database;

/// Well-known user_state keys.
pub mod keys {
    pub const ENERGY_LEVEL: &str = "energy_level";
    pub const MEDICATION_TIME: &str = "medication_time";
    pub const BASE_MULTIPLIER: &str = "base_multiplier";
    pub const CURRENT_TASK: &str = "current_task";
}

/// Snapshot of the state the multiplier is derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    /// Stored base multiplier (default 1.5).
    pub base_multiplier: f64,
    /// Current energy level, 1-10.
    pub energy_level: u8,
    /// When medication was last taken, if recorded.
    pub medication_time: Option<DateTime<Utc>>,
    /// Peak window as (start, end) hours after medication.
    pub peak_window_hours: (i64, i64),
}

impl Default for UserSnapshot {
    fn default() -> Self {
        Self {
            base_multiplier: 1.5,
            energy_level: 5,
            medication_time: None,
            peak_window_hours: (1, 5),
        }
    }
}

/// Detailed peak window information.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PeakWindowStatus {
    NoMedicationLogged,
    NotYet { minutes_until_peak: i64 },
    Active { minutes_remaining: i64 },
    Ended,
}

/// Where a calibration's multiplier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiplierSource {
    /// Learned per-category correction (>= 3 history samples).
    CategoryHistory,
    /// Generic state-derived heuristic.
    Dynamic,
}

/// A calibrated estimate with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct Calibration {
    pub original_estimate: u32,
    pub multiplier: f64,
    pub source: MultiplierSource,
    pub calibrated_estimate: u32,
}

impl UserSnapshot {
    /// Load the snapshot from stored state, falling back to config defaults.
    ///
    /// # Errors
    /// Returns an error only if the storage medium is unavailable; malformed
    /// fields degrade to their defaults inside the store.
    pub fn load(db: &Database, config: &Config) -> Result<Self, DatabaseError> {
        Ok(Self {
            base_multiplier: db.get_state_or(keys::BASE_MULTIPLIER, config.base_multiplier)?,
            energy_level: db.get_state_or(keys::ENERGY_LEVEL, 5)?,
            medication_time: db.get_state(keys::MEDICATION_TIME)?,
            peak_window_hours: config.peak_window_hours,
        })
    }

    /// True when `now` falls inside the medication peak window.
    ///
    /// With no medication recorded the window is inactive.
    pub fn is_in_peak_window(&self, now: DateTime<Utc>) -> bool {
        let Some(taken) = self.medication_time else {
            return false;
        };
        let start = taken + Duration::hours(self.peak_window_hours.0);
        let end = taken + Duration::hours(self.peak_window_hours.1);
        start <= now && now <= end
    }

    /// Detailed peak window status for display.
    pub fn peak_window_status(&self, now: DateTime<Utc>) -> PeakWindowStatus {
        let Some(taken) = self.medication_time else {
            return PeakWindowStatus::NoMedicationLogged;
        };
        let start = taken + Duration::hours(self.peak_window_hours.0);
        let end = taken + Duration::hours(self.peak_window_hours.1);

        if now < start {
            PeakWindowStatus::NotYet {
                minutes_until_peak: (start - now).num_minutes(),
            }
        } else if now > end {
            PeakWindowStatus::Ended
        } else {
            PeakWindowStatus::Active {
                minutes_remaining: (end - now).num_minutes(),
            }
        }
    }

    /// Real-time multiplier from the current state.
    ///
    /// Adjustments, in order: energy level, off-peak penalty, time of day
    /// (the off-peak and time-of-day penalties are independent and stack).
    /// The result is floored at 1.0 -- a calibrated estimate is never
    /// shorter than the raw one -- and rounded to two decimals.
    ///
    /// `now` carries the caller's timezone: the hour-of-day adjustment uses
    /// the local hour, the peak window comparison uses the UTC instant.
    pub fn dynamic_multiplier<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> f64 {
        let mut mult = self.base_multiplier;

        if self.energy_level <= 3 {
            mult += 0.4;
        } else if self.energy_level <= 5 {
            mult += 0.2;
        } else if self.energy_level >= 8 {
            mult -= 0.1;
        }

        if !self.is_in_peak_window(now.with_timezone(&Utc)) {
            mult += 0.3;
        }

        let hour = now.hour();
        if hour >= 20 {
            mult += 0.25;
        } else if hour >= 15 {
            mult += 0.15;
        }

        round2(mult.max(1.0))
    }
}

/// Calibrate a raw estimate.
///
/// A learned per-category multiplier overrides the dynamic heuristic
/// outright: once a category has enough samples, its signal is more
/// reliable than the generic adjustments.
pub fn calibrate<Tz: TimeZone>(
    estimated_minutes: u32,
    snapshot: &UserSnapshot,
    learned: Option<f64>,
    now: &DateTime<Tz>,
) -> Calibration {
    let (multiplier, source) = match learned {
        Some(m) => (round2(m), MultiplierSource::CategoryHistory),
        None => (snapshot.dynamic_multiplier(now), MultiplierSource::Dynamic),
    };
    Calibration {
        original_estimate: estimated_minutes,
        multiplier,
        source,
        calibrated_estimate: (f64::from(estimated_minutes) * multiplier).floor() as u32,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, 30, 0).unwrap()
    }

    #[test]
    fn low_energy_late_evening_no_medication() {
        let snapshot = UserSnapshot {
            energy_level: 2,
            ..Default::default()
        };
        let now = at_hour(21);
        // 1.5 base + 0.4 energy + 0.3 off-peak + 0.25 evening
        assert!((snapshot.dynamic_multiplier(&now) - 2.45).abs() < f64::EPSILON);

        let cal = calibrate(30, &snapshot, None, &now);
        assert_eq!(cal.calibrated_estimate, 73);
        assert_eq!(cal.source, MultiplierSource::Dynamic);
    }

    #[test]
    fn high_energy_in_window_morning() {
        let now = at_hour(10);
        let snapshot = UserSnapshot {
            energy_level: 9,
            medication_time: Some(now - Duration::hours(2)),
            ..Default::default()
        };
        // 1.5 base - 0.1 energy, in window, morning
        assert!((snapshot.dynamic_multiplier(&now) - 1.4).abs() < f64::EPSILON);
    }

    #[test]
    fn afternoon_slump_tier() {
        let snapshot = UserSnapshot {
            energy_level: 6,
            ..Default::default()
        };
        // 1.5 + 0.3 off-peak + 0.15 afternoon
        assert!((snapshot.dynamic_multiplier(&at_hour(16)) - 1.95).abs() < f64::EPSILON);
        // Evening tier takes precedence over the afternoon one.
        assert!((snapshot.dynamic_multiplier(&at_hour(20)) - 2.05).abs() < f64::EPSILON);
    }

    #[test]
    fn peak_window_boundaries() {
        let now = at_hour(12);
        let snapshot = UserSnapshot {
            medication_time: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert!(snapshot.is_in_peak_window(now));

        let too_soon = UserSnapshot {
            medication_time: Some(now - Duration::minutes(30)),
            ..Default::default()
        };
        assert!(!too_soon.is_in_peak_window(now));

        let ended = UserSnapshot {
            medication_time: Some(now - Duration::hours(6)),
            ..Default::default()
        };
        assert!(!ended.is_in_peak_window(now));
    }

    #[test]
    fn peak_window_status_detail() {
        let now = at_hour(12);
        let none = UserSnapshot::default();
        assert_eq!(
            none.peak_window_status(now),
            PeakWindowStatus::NoMedicationLogged
        );

        let soon = UserSnapshot {
            medication_time: Some(now - Duration::minutes(30)),
            ..Default::default()
        };
        assert_eq!(
            soon.peak_window_status(now),
            PeakWindowStatus::NotYet {
                minutes_until_peak: 30
            }
        );

        let active = UserSnapshot {
            medication_time: Some(now - Duration::hours(2)),
            ..Default::default()
        };
        assert_eq!(
            active.peak_window_status(now),
            PeakWindowStatus::Active {
                minutes_remaining: 180
            }
        );

        let ended = UserSnapshot {
            medication_time: Some(now - Duration::hours(6)),
            ..Default::default()
        };
        assert_eq!(ended.peak_window_status(now), PeakWindowStatus::Ended);
    }

    #[test]
    fn learned_multiplier_overrides_dynamic() {
        let snapshot = UserSnapshot {
            energy_level: 2,
            ..Default::default()
        };
        let cal = calibrate(30, &snapshot, Some(1.103), &at_hour(21));
        assert_eq!(cal.source, MultiplierSource::CategoryHistory);
        assert!((cal.multiplier - 1.1).abs() < f64::EPSILON);
        assert_eq!(cal.calibrated_estimate, 33);
    }

    proptest! {
        #[test]
        fn multiplier_never_drops_below_one(
            energy in 1u8..=10,
            med_offset_minutes in proptest::option::of(-720i64..720),
            hour in 0u32..24,
        ) {
            let now = at_hour(hour);
            let snapshot = UserSnapshot {
                energy_level: energy,
                medication_time: med_offset_minutes.map(|m| now - Duration::minutes(m)),
                ..Default::default()
            };
            let mult = snapshot.dynamic_multiplier(&now);
            prop_assert!(mult >= 1.0);
            // Rounded to two decimals.
            prop_assert!(((mult * 100.0).round() - mult * 100.0).abs() < 1e-9);
        }
    }
}
