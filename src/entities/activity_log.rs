//! Activity log entity - The append-only audit trail.
//!
//! Rows are never rewritten after insert, except for the three review columns.
//! Target identity and actor identity are copied in at write time so the entry
//! stays readable after the target is gone or the actor's role changes.
//! Snapshot columns hold the versioned JSON produced by `core::snapshot`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Activity log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activity_logs")]
pub struct Model {
    /// Unique identifier, also the insertion order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// One of `created`, `updated`, `deleted`, `restored`, `bulk_created`,
    /// `bulk_updated`, `bulk_deleted`, `viewed`, `exported`
    pub action: String,
    /// `budget_item`, `project` or `breakdown`
    pub target_type: String,
    /// Target id; absent once the target can no longer be referenced
    pub target_id: Option<i64>,
    /// Target name at action time
    pub target_name: Option<String>,
    /// Implementing office at action time
    pub implementing_office: Option<String>,
    /// Location summary at action time
    pub location: Option<String>,
    /// Serialized snapshot before the action
    #[sea_orm(column_type = "Text", nullable)]
    pub previous_values: Option<String>,
    /// Serialized snapshot after the action
    #[sea_orm(column_type = "Text", nullable)]
    pub new_values: Option<String>,
    /// Serialized ordered list of changed field names
    #[sea_orm(column_type = "Text", nullable)]
    pub changed_fields: Option<String>,
    /// Serialized change summary
    #[sea_orm(column_type = "Text", nullable)]
    pub change_summary: Option<String>,
    /// Acting user id
    pub actor_id: i64,
    /// Acting user's name at action time
    pub actor_name: String,
    /// Acting user's email at action time
    pub actor_email: String,
    /// Acting user's role at action time
    pub actor_role: String,
    /// Caller-supplied reason
    pub reason: Option<String>,
    /// `web_ui`, `bulk_import`, `api`, `system` or `migration`
    pub source: String,
    /// Correlates entries written by one bulk operation
    pub batch_id: Option<String>,
    /// When the action happened
    pub timestamp: DateTimeUtc,
    /// Review annotation
    pub is_reviewed: bool,
    /// Reviewer
    pub reviewed_by: Option<i64>,
    /// When the entry was reviewed
    pub reviewed_at: Option<DateTimeUtc>,
}

/// `ActivityLog` rows keep no foreign keys so they outlive their targets
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
