//! Tier scheduler.
//!
//! Each tier gets its own background task so a slow weekly sweep never delays
//! the near-real-time one. The engine's guard keeps overlapping sweeps off the
//! same account.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime, TimeZone, Utc, Weekday};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::ResolvedSchedule;
use crate::sync::{SyncEngine, Tier};

/// When a tier fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed period, first run immediately.
    Every(Duration),
    /// Every day at `at`, except on `except`.
    DailyExcept { at: NaiveTime, except: Weekday },
    /// Once a week on `day` at `at`.
    Weekly { day: Weekday, at: NaiveTime },
}

impl Cadence {
    pub fn for_tier(tier: Tier, schedule: &ResolvedSchedule) -> Self {
        match tier {
            Tier::Realtime => Cadence::Every(schedule.realtime_interval),
            Tier::EndOfDay => Cadence::DailyExcept {
                at: schedule.daily_at,
                except: schedule.weekly_day,
            },
            Tier::Weekly => Cadence::Weekly {
                day: schedule.weekly_day,
                at: schedule.weekly_at,
            },
        }
    }

    fn fires_on(&self, day: Weekday) -> bool {
        match *self {
            Cadence::Every(_) => true,
            Cadence::DailyExcept { except, .. } => day != except,
            Cadence::Weekly { day: weekly, .. } => day == weekly,
        }
    }

    /// Next fire time strictly after `now`, with wall-clock times read in
    /// `offset`. `Every` fires one period after `now`.
    pub fn next_after(&self, now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
        let at = match *self {
            Cadence::Every(period) => {
                let period = chrono::Duration::from_std(period)
                    .unwrap_or_else(|_| chrono::Duration::days(1));
                return now + period;
            }
            Cadence::DailyExcept { at, .. } | Cadence::Weekly { at, .. } => at,
        };

        let local_now = now.with_timezone(&offset);
        let mut date = local_now.date_naive();
        // Today plus seven days always contains a matching weekday.
        for _ in 0..8 {
            if self.fires_on(date.weekday()) {
                if let Some(candidate) = offset.from_local_datetime(&date.and_time(at)).single() {
                    if candidate > local_now {
                        return candidate.with_timezone(&Utc);
                    }
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        now + chrono::Duration::days(7)
    }
}

/// Background runner for the three tiers.
pub struct Scheduler {
    engine: Arc<SyncEngine>,
    schedule: ResolvedSchedule,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>, schedule: ResolvedSchedule) -> Self {
        Self { engine, schedule }
    }

    /// Spawn one task per tier.
    ///
    /// Returns handles that can be used to abort the tasks.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        Tier::ALL
            .into_iter()
            .map(|tier| {
                let cadence = Cadence::for_tier(tier, &self.schedule);
                info!(tier = %tier, cadence = ?cadence, "Scheduling tier");
                spawn_tier(self.engine.clone(), tier, cadence, self.schedule.offset)
            })
            .collect()
    }
}

fn spawn_tier(
    engine: Arc<SyncEngine>,
    tier: Tier,
    cadence: Cadence,
    offset: FixedOffset,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Cadence::Every(period) = cadence {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                run_sweep(&engine, tier).await;
            }
        }

        loop {
            let now = Utc::now();
            let next = cadence.next_after(now, offset);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(tier = %tier, next = %next, "Waiting for next sweep");

            tokio::time::sleep(wait).await;
            run_sweep(&engine, tier).await;
        }
    })
}

/// Run one sweep on its own task so a panic ends the sweep, not the schedule.
async fn run_sweep(engine: &Arc<SyncEngine>, tier: Tier) {
    let engine = engine.clone();
    if let Err(e) = tokio::spawn(async move { engine.run_tier(tier).await }).await {
        error!(tier = %tier, error = %e, "Tier sweep aborted");
    }
}
