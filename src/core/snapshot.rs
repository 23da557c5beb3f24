//! Record snapshots stored in the audit trail.
//!
//! A snapshot is the full record of one entity kind at a point in time. It is
//! written into the activity log as a small versioned JSON envelope so that
//! old entries stay decodable when the entity shapes grow.

use crate::{
    entities::{budget_item, project, project_breakdown},
    errors::{Error, Result},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Current envelope version written by [`RecordSnapshot::encode`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Kind of record an audit entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// A budget item
    BudgetItem,
    /// A project
    Project,
    /// A project breakdown row
    Breakdown,
}

impl TargetType {
    /// Name stored in `activity_logs.target_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BudgetItem => "budget_item",
            Self::Project => "project",
            Self::Breakdown => "breakdown",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full copy of one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSnapshot {
    /// Budget item row
    BudgetItem(budget_item::Model),
    /// Project row
    Project(project::Model),
    /// Breakdown row
    Breakdown(project_breakdown::Model),
}

/// Identity fields copied into an audit entry so it stays searchable after
/// the target is gone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetIdentity {
    /// Display name of the target
    pub name: Option<String>,
    /// Implementing office
    pub office: Option<String>,
    /// Location summary
    pub location: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct StoredSnapshot {
    v: u32,
    kind: TargetType,
    data: Value,
}

impl RecordSnapshot {
    /// Entity kind of the snapshot.
    #[must_use]
    pub const fn kind(&self) -> TargetType {
        match self {
            Self::BudgetItem(_) => TargetType::BudgetItem,
            Self::Project(_) => TargetType::Project,
            Self::Breakdown(_) => TargetType::Breakdown,
        }
    }

    /// Primary key of the captured record.
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::BudgetItem(m) => m.id,
            Self::Project(m) => m.id,
            Self::Breakdown(m) => m.id,
        }
    }

    /// The record as a field-name → value object, the shape the differ compares.
    pub fn fields(&self) -> Result<Value> {
        let value = match self {
            Self::BudgetItem(m) => serde_json::to_value(m)?,
            Self::Project(m) => serde_json::to_value(m)?,
            Self::Breakdown(m) => serde_json::to_value(m)?,
        };
        Ok(value)
    }

    /// Denormalized identity. Breakdowns carry only their location; callers
    /// that know the owning project fill in the name and office.
    #[must_use]
    pub fn identity(&self) -> TargetIdentity {
        match self {
            Self::BudgetItem(m) => TargetIdentity {
                name: Some(m.name.clone()),
                ..TargetIdentity::default()
            },
            Self::Project(m) => TargetIdentity {
                name: Some(m.name.clone()),
                office: Some(m.implementing_office.clone()),
                location: None,
            },
            Self::Breakdown(m) => TargetIdentity {
                location: location_label(m),
                ..TargetIdentity::default()
            },
        }
    }

    /// Serializes into the versioned envelope stored in the activity log.
    pub fn encode(&self) -> Result<String> {
        let stored = StoredSnapshot {
            v: SNAPSHOT_VERSION,
            kind: self.kind(),
            data: self.fields()?,
        };
        serde_json::to_string(&stored).map_err(Into::into)
    }

    /// Decodes a stored envelope.
    pub fn decode(raw: &str) -> Result<Self> {
        let stored: StoredSnapshot = serde_json::from_str(raw)?;
        if stored.v != SNAPSHOT_VERSION {
            return Err(Error::Validation {
                message: format!("Unsupported snapshot version {}", stored.v),
            });
        }

        let snapshot = match stored.kind {
            TargetType::BudgetItem => Self::BudgetItem(serde_json::from_value(stored.data)?),
            TargetType::Project => Self::Project(serde_json::from_value(stored.data)?),
            TargetType::Breakdown => Self::Breakdown(serde_json::from_value(stored.data)?),
        };
        Ok(snapshot)
    }
}

/// "barangay, municipality, district", skipping blanks.
#[must_use]
pub fn location_label(breakdown: &project_breakdown::Model) -> Option<String> {
    let parts: Vec<&str> = [
        breakdown.barangay.as_deref(),
        breakdown.municipality.as_deref(),
        breakdown.district.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
