//! Tier scheduling configuration.

use std::time::Duration;

use chrono::{FixedOffset, NaiveTime, Weekday};
use serde::Deserialize;

use super::ConfigError;

/// Raw scheduler settings as read from YAML/env.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Disable to run only manual triggers.
    pub enabled: bool,
    /// Near-real-time tier period in seconds.
    pub realtime_interval_secs: u64,
    /// End-of-day tier wall-clock time, `HH:MM`.
    pub daily_at: String,
    /// Day the weekly tier runs; the end-of-day tier skips it.
    pub weekly_day: String,
    /// Weekly tier wall-clock time, `HH:MM`.
    pub weekly_at: String,
    /// Offset of the operators' local time from UTC, in hours. Dates of
    /// import windows and wall-clock triggers are computed in this offset.
    pub utc_offset_hours: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            realtime_interval_secs: 15 * 60,
            daily_at: "23:30".to_string(),
            weekly_day: "sun".to_string(),
            weekly_at: "23:30".to_string(),
            utc_offset_hours: 0,
        }
    }
}

/// Validated schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSchedule {
    pub realtime_interval: Duration,
    pub daily_at: NaiveTime,
    pub weekly_day: Weekday,
    pub weekly_at: NaiveTime,
    pub offset: FixedOffset,
}

impl SchedulerConfig {
    pub fn resolve(&self) -> Result<ResolvedSchedule, ConfigError> {
        if self.realtime_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.realtime_interval_secs",
                reason: "must be positive".to_string(),
            });
        }

        let weekly_day = self
            .weekly_day
            .parse::<Weekday>()
            .map_err(|e| ConfigError::Invalid {
                field: "scheduler.weekly_day",
                reason: format!("{:?}: {}", self.weekly_day, e),
            })?;

        let offset = FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            ConfigError::Invalid {
                field: "scheduler.utc_offset_hours",
                reason: format!("{} is out of range", self.utc_offset_hours),
            }
        })?;

        Ok(ResolvedSchedule {
            realtime_interval: Duration::from_secs(self.realtime_interval_secs),
            daily_at: parse_clock("scheduler.daily_at", &self.daily_at)?,
            weekly_day,
            weekly_at: parse_clock("scheduler.weekly_at", &self.weekly_at)?,
            offset,
        })
    }
}

fn parse_clock(field: &'static str, value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{:?}: {}", value, e),
    })
}
