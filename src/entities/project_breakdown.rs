//! Project breakdown entity - One dated report row in a project's ledger.
//!
//! Several breakdowns per project form a time series. `trash_event_id` is set
//! only on rows that were soft-deleted by trashing their parent project.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Project breakdown database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_breakdowns")]
pub struct Model {
    /// Unique identifier for the breakdown
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning project
    pub project_id: i64,
    /// Date the report refers to
    pub report_date: Date,
    /// Legislative district
    pub district: Option<String>,
    /// Municipality
    pub municipality: Option<String>,
    /// Barangay
    pub barangay: Option<String>,
    /// Appropriated amount at report time
    pub appropriation: f64,
    /// Obligated amount at report time
    pub obligation: f64,
    /// Remaining balance at report time
    pub balance: f64,
    /// Physical accomplishment, as a percentage
    pub accomplishment_rate: f64,
    /// Breakdown status (`ongoing`, `delayed`, `completed`, `on_hold`, `cancelled`)
    pub status: Option<String>,
    /// Free-text remarks
    pub remarks: Option<String>,
    /// Soft delete flag
    pub is_deleted: bool,
    /// When the row was soft-deleted
    pub deleted_at: Option<DateTimeUtc>,
    /// Who soft-deleted the row
    pub deleted_by: Option<i64>,
    /// Trash event of the parent project that cascaded onto this row
    pub trash_event_id: Option<String>,
    /// User who created the record
    pub created_by: i64,
    /// When the record was created
    pub created_at: DateTimeUtc,
    /// User who last touched the record
    pub updated_by: Option<i64>,
    /// When the record was last touched
    pub updated_at: Option<DateTimeUtc>,
}

/// Defines relationships between `ProjectBreakdown` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each breakdown belongs to one project
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
