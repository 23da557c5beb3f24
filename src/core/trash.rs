//! Trash for projects - soft deletion with a cascade to breakdowns.
//!
//! Trashing stamps the project and every active breakdown with one trash
//! event id so a restore can tell cascade-deleted rows from rows deleted on
//! their own.

use crate::{
    core::{
        activity::{self, ActivityAction, LogConfig},
        budget_item,
        project::{self, require_project},
        snapshot::RecordSnapshot,
    },
    entities::{ProjectBreakdown, project as project_entity, project_breakdown},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{info, instrument};
use uuid::Uuid;

/// Which deleted breakdowns come back with their project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestorePolicy {
    /// Every deleted breakdown of the project
    #[default]
    AllDeleted,
    /// Only breakdowns deleted by the project's own trash event
    CascadeOnly,
}

/// Result of a trash or restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrashOutcome {
    /// The trashed or restored project
    pub project_id: i64,
    /// Breakdowns flagged or unflagged along with the project
    pub breakdowns_affected: u64,
}

/// Moves a project and its active breakdowns to the trash.
///
/// # Errors
/// - `ProjectNotFound` if the project does not exist
/// - `Validation` if it is already in the trash
#[instrument(skip(db, reason))]
pub async fn move_to_trash(
    db: &DatabaseConnection,
    project_id: i64,
    actor_id: i64,
    reason: Option<String>,
) -> Result<TrashOutcome> {
    let txn = db.begin().await?;
    let before = require_project(&txn, project_id).await?;
    if before.is_deleted {
        return Err(Error::Validation {
            message: format!("Project {project_id} is already in the trash"),
        });
    }

    let event_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    let mut active: project_entity::ActiveModel = before.clone().into();
    active.is_deleted = Set(true);
    active.deleted_at = Set(Some(now));
    active.deleted_by = Set(Some(actor_id));
    active.trash_event_id = Set(Some(event_id.clone()));
    active.updated_by = Set(Some(actor_id));
    active.updated_at = Set(Some(now));
    let after = active.update(&txn).await?;

    let cascaded = ProjectBreakdown::update_many()
        .col_expr(project_breakdown::Column::IsDeleted, Expr::value(true))
        .col_expr(project_breakdown::Column::DeletedAt, Expr::value(Some(now)))
        .col_expr(project_breakdown::Column::DeletedBy, Expr::value(Some(actor_id)))
        .col_expr(
            project_breakdown::Column::TrashEventId,
            Expr::value(Some(event_id)),
        )
        .col_expr(project_breakdown::Column::UpdatedBy, Expr::value(Some(actor_id)))
        .col_expr(project_breakdown::Column::UpdatedAt, Expr::value(Some(now)))
        .filter(project_breakdown::Column::ProjectId.eq(project_id))
        .filter(project_breakdown::Column::IsDeleted.eq(false))
        .exec(&txn)
        .await?;

    activity::log(
        &txn,
        actor_id,
        LogConfig::with_change(
            ActivityAction::Updated,
            RecordSnapshot::Project(before),
            RecordSnapshot::Project(after.clone()),
        )
        .reason(reason),
    )
    .await?;

    if let Some(parent) = after.budget_item_id {
        budget_item::recompute(&txn, parent, actor_id).await?;
    }
    txn.commit().await?;

    info!(
        "Moved project {} to trash with {} breakdown(s)",
        project_id, cascaded.rows_affected
    );
    Ok(TrashOutcome {
        project_id,
        breakdowns_affected: cascaded.rows_affected,
    })
}

/// Restores a trashed project and its deleted breakdowns per `policy`.
///
/// # Errors
/// - `ProjectNotFound` if the project does not exist
/// - `Validation` if it is not in the trash
#[instrument(skip(db))]
pub async fn restore_from_trash(
    db: &DatabaseConnection,
    project_id: i64,
    actor_id: i64,
    policy: RestorePolicy,
) -> Result<TrashOutcome> {
    let txn = db.begin().await?;
    let before = require_project(&txn, project_id).await?;
    if !before.is_deleted {
        return Err(Error::Validation {
            message: format!("Project {project_id} is not in the trash"),
        });
    }

    let restore_children = ProjectBreakdown::update_many()
        .col_expr(project_breakdown::Column::IsDeleted, Expr::value(false))
        .col_expr(
            project_breakdown::Column::DeletedAt,
            Expr::value(Option::<DateTimeUtc>::None),
        )
        .col_expr(
            project_breakdown::Column::DeletedBy,
            Expr::value(Option::<i64>::None),
        )
        .col_expr(
            project_breakdown::Column::TrashEventId,
            Expr::value(Option::<String>::None),
        )
        .col_expr(project_breakdown::Column::UpdatedBy, Expr::value(Some(actor_id)))
        .col_expr(project_breakdown::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(project_breakdown::Column::ProjectId.eq(project_id))
        .filter(project_breakdown::Column::IsDeleted.eq(true));

    let restored = match (policy, before.trash_event_id.clone()) {
        (RestorePolicy::AllDeleted, _) => restore_children.exec(&txn).await?.rows_affected,
        (RestorePolicy::CascadeOnly, Some(event_id)) => {
            restore_children
                .filter(project_breakdown::Column::TrashEventId.eq(event_id))
                .exec(&txn)
                .await?
                .rows_affected
        }
        (RestorePolicy::CascadeOnly, None) => 0,
    };

    let mut active: project_entity::ActiveModel = before.clone().into();
    active.is_deleted = Set(false);
    active.deleted_at = Set(None);
    active.deleted_by = Set(None);
    active.trash_event_id = Set(None);
    active.updated_by = Set(Some(actor_id));
    active.updated_at = Set(Some(Utc::now()));
    let after = active.update(&txn).await?;

    activity::log(
        &txn,
        actor_id,
        LogConfig::with_change(
            ActivityAction::Restored,
            RecordSnapshot::Project(before),
            RecordSnapshot::Project(after),
        ),
    )
    .await?;

    project::recompute(&txn, project_id, actor_id).await?;
    txn.commit().await?;

    info!(
        "Restored project {} with {} breakdown(s)",
        project_id, restored
    );
    Ok(TrashOutcome {
        project_id,
        breakdowns_affected: restored,
    })
}
