//! Budget item entity - A top-level funding line.
//!
//! Everything except the name, description and allocation is derived from the
//! budget item's non-deleted projects and is rewritten on every recompute.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Budget item database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budget_items")]
pub struct Model {
    /// Unique identifier for the budget item
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Unique name of the funding line (e.g., "Road Maintenance Fund")
    #[sea_orm(unique)]
    pub name: String,
    /// Optional free-text description
    pub description: Option<String>,
    /// Budget allocated to this line
    pub total_budget_allocated: f64,
    /// Sum of active projects' obligated budget
    pub obligated_budget: f64,
    /// Sum of active projects' utilized budget
    pub total_budget_utilized: f64,
    /// Utilized over allocated, as a percentage
    pub utilization_rate: f64,
    /// Rollup status: `"ongoing"`, `"delayed"` or `"completed"`
    pub status: String,
    /// Number of active projects with status completed
    pub project_completed: i32,
    /// Number of active projects with status delayed
    pub project_delayed: i32,
    /// Number of active projects with status ongoing
    pub projects_on_track: i32,
    /// Bumped on every recompute write; guards against lost updates
    pub aggregate_version: i64,
    /// User who created the record
    pub created_by: i64,
    /// When the record was created
    pub created_at: DateTimeUtc,
    /// User who last touched the record
    pub updated_by: Option<i64>,
    /// When the record was last touched
    pub updated_at: Option<DateTimeUtc>,
}

/// Defines relationships between `BudgetItem` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One budget item funds many projects
    #[sea_orm(has_many = "super::project::Entity")]
    Projects,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Projects.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
