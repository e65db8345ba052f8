//! Time tiers of the sync schedule.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::model::{DateWindow, PageMode};

/// One of the three scheduled sweeps. All run the same per-account work
/// with a different window and page mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Every few minutes: yesterday and today, first page only.
    Realtime,
    /// Once a day except the weekly day: the last two days, all pages.
    EndOfDay,
    /// Once a week: the last seven days, all pages.
    Weekly,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Realtime, Tier::EndOfDay, Tier::Weekly];

    /// Name written to the audit log.
    pub fn job_name(&self) -> &'static str {
        match self {
            Tier::Realtime => "tier_realtime",
            Tier::EndOfDay => "tier_end_of_day",
            Tier::Weekly => "tier_weekly",
        }
    }

    fn days_back(&self) -> u64 {
        match self {
            Tier::Realtime => 1,
            Tier::EndOfDay => 2,
            Tier::Weekly => 7,
        }
    }

    pub fn page_mode(&self) -> PageMode {
        match self {
            Tier::Realtime => PageMode::FirstPageOnly,
            Tier::EndOfDay | Tier::Weekly => PageMode::AllPages,
        }
    }

    /// Import window for a sweep started on `today` (operator-local date).
    pub fn window(&self, today: NaiveDate) -> DateWindow {
        DateWindow::ending_on(today, self.days_back())
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Realtime => "realtime",
            Tier::EndOfDay => "end-of-day",
            Tier::Weekly => "weekly",
        };
        f.write_str(name)
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "realtime" | "a" => Ok(Tier::Realtime),
            "end-of-day" | "end_of_day" | "daily" | "b" => Ok(Tier::EndOfDay),
            "weekly" | "c" => Ok(Tier::Weekly),
            other => Err(format!(
                "unknown tier {:?} (expected realtime, end-of-day or weekly)",
                other
            )),
        }
    }
}
