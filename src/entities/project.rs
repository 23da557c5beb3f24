//! Project entity - A funded initiative under an optional budget item.
//!
//! `utilization_rate` comes from the project's own financial fields, while
//! `status` and the three counters are derived from its active breakdowns.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Project database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    /// Unique identifier for the project
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Parent budget item, if the project is linked to one
    pub budget_item_id: Option<i64>,
    /// Project name
    pub name: String,
    /// Office responsible for implementation
    pub implementing_office: String,
    /// Budget allocated to the project
    pub total_budget_allocated: f64,
    /// Budget obligated so far
    pub obligated_budget: f64,
    /// Budget utilized so far
    pub total_budget_utilized: f64,
    /// Utilized over allocated, as a percentage
    pub utilization_rate: f64,
    /// Rollup status derived from breakdowns
    pub status: String,
    /// Number of active breakdowns with status completed
    pub project_completed: i32,
    /// Number of active breakdowns with status delayed
    pub project_delayed: i32,
    /// Number of active breakdowns counted as on track
    pub projects_on_track: i32,
    /// Planned completion date
    pub target_date_completion: Option<Date>,
    /// Assigned project manager
    pub project_manager_id: Option<i64>,
    /// Free-text remarks
    pub remarks: Option<String>,
    /// Soft delete flag
    pub is_deleted: bool,
    /// When the project was moved to trash
    pub deleted_at: Option<DateTimeUtc>,
    /// Who moved the project to trash
    pub deleted_by: Option<i64>,
    /// Identifies the trash event, shared with the breakdowns it cascaded onto
    pub trash_event_id: Option<String>,
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

/// Defines relationships between Project and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each project may belong to one budget item
    #[sea_orm(
        belongs_to = "super::budget_item::Entity",
        from = "Column::BudgetItemId",
        to = "super::budget_item::Column::Id"
    )]
    BudgetItem,
    /// One project has many breakdown reports
    #[sea_orm(has_many = "super::project_breakdown::Entity")]
    Breakdowns,
}

impl Related<super::budget_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BudgetItem.def()
    }
}

impl Related<super::project_breakdown::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Breakdowns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
