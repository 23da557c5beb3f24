//! Rollup math - status vocabulary, counting and the derived-field formulas.
//!
//! Everything here is pure. The aggregators in `core::budget_item` and
//! `core::project` load the active children, hand them to these functions and
//! persist what comes back, so recompute is a function of the children alone.

use crate::{
    entities::{project, project_breakdown},
    errors::{Error, Result},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How many times a recompute re-reads its children after losing a version race.
pub const RECOMPUTE_ATTEMPTS: u32 = 3;

/// Status of a budget item or project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupStatus {
    /// Work in progress
    Ongoing,
    /// Behind schedule
    Delayed,
    /// Finished
    Completed,
}

impl RollupStatus {
    /// Canonical lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Delayed => "delayed",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for RollupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RollupStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match BreakdownStatus::from_str(s)? {
            BreakdownStatus::Ongoing => Ok(Self::Ongoing),
            BreakdownStatus::Delayed => Ok(Self::Delayed),
            BreakdownStatus::Completed => Ok(Self::Completed),
            other => Err(Error::Validation {
                message: format!("'{other}' is not a project status"),
            }),
        }
    }
}

/// Status reported on a breakdown row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakdownStatus {
    /// Work in progress
    Ongoing,
    /// Behind schedule
    Delayed,
    /// Finished
    Completed,
    /// Paused; still counted as on track
    OnHold,
    /// Abandoned; counted nowhere
    Cancelled,
}

impl BreakdownStatus {
    /// Canonical lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Delayed => "delayed",
            Self::Completed => "completed",
            Self::OnHold => "on_hold",
            Self::Cancelled => "cancelled",
        }
    }

    /// Normalizes free-form status text into its canonical stored form.
    pub fn normalize(raw: &str) -> Result<String> {
        raw.parse::<Self>().map(|s| s.as_str().to_string())
    }
}

impl fmt::Display for BreakdownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BreakdownStatus {
    type Err = Error;

    /// Accepts the canonical names plus older spellings such as `"On-Going"`,
    /// `"On-Hold"` and `"Completed"`.
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "ongoing" | "inprogress" => Ok(Self::Ongoing),
            "delayed" => Ok(Self::Delayed),
            "completed" | "complete" => Ok(Self::Completed),
            "onhold" => Ok(Self::OnHold),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(Error::Validation {
                message: format!("Unknown status '{s}'"),
            }),
        }
    }
}

/// Per-status child counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// Children that are completed
    pub completed: i32,
    /// Children that are delayed
    pub delayed: i32,
    /// Children that are ongoing (or on hold, for breakdowns)
    pub on_track: i32,
}

impl StatusCounts {
    /// Counts projects by their stored status. Unparseable statuses count nowhere.
    #[must_use]
    pub fn from_projects(projects: &[project::Model]) -> Self {
        let mut counts = Self::default();
        for status in projects.iter().filter_map(|p| p.status.parse().ok()) {
            counts.record(status);
        }
        counts
    }

    /// Counts breakdowns by normalized status. On-hold counts as on track;
    /// cancelled and missing statuses count nowhere.
    #[must_use]
    pub fn from_breakdowns(breakdowns: &[project_breakdown::Model]) -> Self {
        let mut counts = Self::default();
        for status in breakdowns
            .iter()
            .filter_map(|b| b.status.as_deref())
            .filter_map(|s| s.parse::<BreakdownStatus>().ok())
        {
            match status {
                BreakdownStatus::Ongoing | BreakdownStatus::OnHold => {
                    counts.record(RollupStatus::Ongoing);
                }
                BreakdownStatus::Delayed => counts.record(RollupStatus::Delayed),
                BreakdownStatus::Completed => counts.record(RollupStatus::Completed),
                BreakdownStatus::Cancelled => {}
            }
        }
        counts
    }

    const fn record(&mut self, status: RollupStatus) {
        match status {
            RollupStatus::Ongoing => self.on_track += 1,
            RollupStatus::Delayed => self.delayed += 1,
            RollupStatus::Completed => self.completed += 1,
        }
    }

    /// Most urgent status wins: any ongoing child keeps the parent ongoing,
    /// then delayed, then completed. No children at all means ongoing.
    #[must_use]
    pub const fn derive_status(&self) -> RollupStatus {
        if self.on_track > 0 {
            RollupStatus::Ongoing
        } else if self.delayed > 0 {
            RollupStatus::Delayed
        } else if self.completed > 0 {
            RollupStatus::Completed
        } else {
            RollupStatus::Ongoing
        }
    }
}

/// `utilized / allocated * 100`, or 0 when nothing is allocated.
#[must_use]
pub fn utilization_rate(allocated: f64, utilized: f64) -> f64 {
    if allocated > 0.0 {
        (utilized / allocated) * 100.0
    } else {
        0.0
    }
}

/// Derived fields of a budget item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetRollup {
    /// Sum of active projects' obligated budget
    pub obligated: f64,
    /// Sum of active projects' utilized budget
    pub utilized: f64,
    /// Utilization against the budget item's own allocation
    pub utilization_rate: f64,
    /// Per-status project counts
    pub counts: StatusCounts,
    /// Priority-derived status
    pub status: RollupStatus,
}

impl BudgetRollup {
    /// Rolls up a budget item's active projects against its own allocation.
    #[must_use]
    pub fn from_projects(allocated: f64, projects: &[project::Model]) -> Self {
        let obligated = projects.iter().map(|p| p.obligated_budget).sum();
        let utilized = projects.iter().map(|p| p.total_budget_utilized).sum();
        let counts = StatusCounts::from_projects(projects);

        Self {
            obligated,
            utilized,
            utilization_rate: utilization_rate(allocated, utilized),
            counts,
            status: counts.derive_status(),
        }
    }
}

/// Checks that a money amount is finite and not negative.
pub fn validate_amount(amount: f64) -> Result<()> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidAmount { amount })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use proptest::prelude::*;

    fn counts(completed: i32, delayed: i32, on_track: i32) -> StatusCounts {
        StatusCounts {
            completed,
            delayed,
            on_track,
        }
    }

    #[test]
    fn test_status_priority() {
        assert_eq!(counts(10, 5, 1).derive_status(), RollupStatus::Ongoing);
        assert_eq!(counts(10, 5, 0).derive_status(), RollupStatus::Delayed);
        assert_eq!(counts(10, 0, 0).derive_status(), RollupStatus::Completed);
        assert_eq!(counts(0, 0, 0).derive_status(), RollupStatus::Ongoing);
    }

    proptest! {
        #[test]
        fn prop_any_on_track_child_means_ongoing(
            completed in 0..1000i32,
            delayed in 0..1000i32,
            on_track in 1..1000i32,
        ) {
            prop_assert_eq!(
                counts(completed, delayed, on_track).derive_status(),
                RollupStatus::Ongoing
            );
        }

        #[test]
        fn prop_delayed_beats_completed(completed in 0..1000i32, delayed in 1..1000i32) {
            prop_assert_eq!(counts(completed, delayed, 0).derive_status(), RollupStatus::Delayed);
        }
    }

    #[test]
    fn test_utilization_rate() {
        assert_eq!(utilization_rate(0.0, 0.0), 0.0);
        assert_eq!(utilization_rate(0.0, 5000.0), 0.0);
        assert_eq!(utilization_rate(100_000.0, 75_000.0), 75.0);
    }

    #[test]
    fn test_status_normalization() {
        assert_eq!(BreakdownStatus::normalize("On-Going").unwrap(), "ongoing");
        assert_eq!(BreakdownStatus::normalize("On-Hold").unwrap(), "on_hold");
        assert_eq!(BreakdownStatus::normalize(" Completed ").unwrap(), "completed");
        assert_eq!(BreakdownStatus::normalize("DELAYED").unwrap(), "delayed");
        assert!(matches!(
            BreakdownStatus::normalize("pending"),
            Err(Error::Validation { .. })
        ));
        assert!("on_hold".parse::<RollupStatus>().is_err());
        assert_eq!("Completed".parse::<RollupStatus>().unwrap(), RollupStatus::Completed);
    }
}
