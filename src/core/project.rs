//! Project business logic - CRUD plus the project-level aggregator.
//!
//! A project's status and per-status counts come from its active breakdowns;
//! its utilization rate comes from its own allocated and utilized amounts and
//! is recomputed on every write. Any change to a project ends with a recompute
//! of the budget item(s) it contributes to, so parent totals never lag.

use crate::{
    core::{
        activity::{self, ActivityAction, BulkLogRecord, BulkOptions, LogConfig, LogSource},
        budget_item::{self, FailurePolicy, RecomputeFailure, RecomputeReport},
        rollup::{RECOMPUTE_ATTEMPTS, RollupStatus, StatusCounts, utilization_rate, validate_amount},
        snapshot::{RecordSnapshot, TargetIdentity, TargetType},
    },
    entities::{BudgetItem, Project, ProjectBreakdown, project, project_breakdown},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

/// Permission gate for destructive operations. Role checks live outside the
/// core; callers pass in whatever implements their policy.
pub trait PermissionCheck: Send + Sync {
    /// Whether `actor_id` may permanently remove `project`.
    fn can_hard_delete(&self, actor_id: i64, project: &project::Model) -> bool;
}

/// Grants everything. For system jobs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionCheck for AllowAll {
    fn can_hard_delete(&self, _actor_id: i64, _project: &project::Model) -> bool {
        true
    }
}

/// Fields for a new project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    /// Funding budget item, if any
    pub budget_item_id: Option<i64>,
    /// Project name
    pub name: String,
    /// Office carrying out the project
    pub implementing_office: String,
    /// Allocated amount
    pub total_budget_allocated: f64,
    /// Obligated amount
    pub obligated_budget: f64,
    /// Utilized amount
    pub total_budget_utilized: f64,
    /// Planned completion date
    pub target_date_completion: Option<Date>,
    /// Responsible user
    pub project_manager_id: Option<i64>,
    /// Notes
    pub remarks: Option<String>,
}

/// Editable project fields. `None` leaves a field unchanged; the nested
/// options set or clear nullable fields.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    /// New parent, `Some(None)` detaches the project
    pub budget_item_id: Option<Option<i64>>,
    /// New name
    pub name: Option<String>,
    /// New implementing office
    pub implementing_office: Option<String>,
    /// New allocation
    pub total_budget_allocated: Option<f64>,
    /// New obligated amount
    pub obligated_budget: Option<f64>,
    /// New utilized amount
    pub total_budget_utilized: Option<f64>,
    /// New target date
    pub target_date_completion: Option<Option<Date>>,
    /// New manager
    pub project_manager_id: Option<Option<i64>>,
    /// New remarks
    pub remarks: Option<Option<String>>,
}

/// Retrieves a project by id, trashed or not.
pub async fn get_project_by_id<C>(db: &C, id: i64) -> Result<Option<project::Model>>
where
    C: ConnectionTrait,
{
    Project::find_by_id(id).one(db).await.map_err(Into::into)
}

/// Active projects of a budget item, ordered by id.
pub async fn get_active_projects_for_budget_item<C>(
    db: &C,
    budget_item_id: i64,
) -> Result<Vec<project::Model>>
where
    C: ConnectionTrait,
{
    Project::find()
        .filter(project::Column::BudgetItemId.eq(budget_item_id))
        .filter(project::Column::IsDeleted.eq(false))
        .order_by_asc(project::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds an active project by name and implementing office.
pub async fn find_active_project<C>(
    db: &C,
    name: &str,
    implementing_office: &str,
) -> Result<Option<project::Model>>
where
    C: ConnectionTrait,
{
    Project::find()
        .filter(project::Column::Name.eq(name))
        .filter(project::Column::ImplementingOffice.eq(implementing_office))
        .filter(project::Column::IsDeleted.eq(false))
        .order_by_asc(project::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

pub(crate) async fn require_project<C>(db: &C, id: i64) -> Result<project::Model>
where
    C: ConnectionTrait,
{
    get_project_by_id(db, id)
        .await?
        .ok_or(Error::ProjectNotFound { id })
}

async fn require_budget_item_exists<C>(db: &C, id: Option<i64>) -> Result<()>
where
    C: ConnectionTrait,
{
    if let Some(id) = id {
        BudgetItem::find_by_id(id)
            .one(db)
            .await?
            .ok_or(Error::BudgetItemNotFound { id })?;
    }
    Ok(())
}

fn validate_new_project(new: &NewProject) -> Result<()> {
    if new.name.trim().is_empty() {
        return Err(Error::Validation {
            message: "Project name cannot be empty".to_string(),
        });
    }
    if new.implementing_office.trim().is_empty() {
        return Err(Error::Validation {
            message: "Implementing office cannot be empty".to_string(),
        });
    }
    validate_amount(new.total_budget_allocated)?;
    validate_amount(new.obligated_budget)?;
    validate_amount(new.total_budget_utilized)
}

/// Creates a project and rolls it into its budget item.
#[instrument(skip(db, new, reason), fields(name = %new.name))]
pub async fn create_project(
    db: &DatabaseConnection,
    actor_id: i64,
    new: NewProject,
    reason: Option<String>,
) -> Result<project::Model> {
    validate_new_project(&new)?;

    let txn = db.begin().await?;
    let project = insert_project(&txn, actor_id, new, reason, LogSource::WebUi).await?;
    txn.commit().await?;

    info!("Created project {} ({})", project.id, project.name);
    Ok(project)
}

/// Inserts, logs and rolls up a project inside the caller's transaction.
pub(crate) async fn insert_project<C>(
    db: &C,
    actor_id: i64,
    new: NewProject,
    reason: Option<String>,
    source: LogSource,
) -> Result<project::Model>
where
    C: ConnectionTrait,
{
    require_budget_item_exists(db, new.budget_item_id).await?;

    let project = project::ActiveModel {
        budget_item_id: Set(new.budget_item_id),
        name: Set(new.name.trim().to_string()),
        implementing_office: Set(new.implementing_office.trim().to_string()),
        total_budget_allocated: Set(new.total_budget_allocated),
        obligated_budget: Set(new.obligated_budget),
        total_budget_utilized: Set(new.total_budget_utilized),
        utilization_rate: Set(utilization_rate(
            new.total_budget_allocated,
            new.total_budget_utilized,
        )),
        status: Set(RollupStatus::Ongoing.as_str().to_string()),
        project_completed: Set(0),
        project_delayed: Set(0),
        projects_on_track: Set(0),
        target_date_completion: Set(new.target_date_completion),
        project_manager_id: Set(new.project_manager_id),
        remarks: Set(new.remarks),
        is_deleted: Set(false),
        deleted_at: Set(None),
        deleted_by: Set(None),
        trash_event_id: Set(None),
        aggregate_version: Set(0),
        created_by: Set(actor_id),
        created_at: Set(Utc::now()),
        updated_by: Set(None),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    activity::log(
        db,
        actor_id,
        LogConfig::with_snapshot(ActivityAction::Created, RecordSnapshot::Project(project.clone()))
            .reason(reason)
            .source(source),
    )
    .await?;

    if let Some(parent) = project.budget_item_id {
        budget_item::recompute(db, parent, actor_id).await?;
    }

    Ok(project)
}

/// Edits a project. When the project moves to another budget item both the
/// old and the new parent are recomputed.
#[instrument(skip(db, update, reason))]
pub async fn update_project(
    db: &DatabaseConnection,
    project_id: i64,
    actor_id: i64,
    update: ProjectUpdate,
    reason: Option<String>,
) -> Result<project::Model> {
    for amount in [
        update.total_budget_allocated,
        update.obligated_budget,
        update.total_budget_utilized,
    ]
    .into_iter()
    .flatten()
    {
        validate_amount(amount)?;
    }
    if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(Error::Validation {
            message: "Project name cannot be empty".to_string(),
        });
    }

    let txn = db.begin().await?;
    let before = require_project(&txn, project_id).await?;
    if before.is_deleted {
        return Err(Error::Validation {
            message: format!("Project {project_id} is in the trash; restore it before editing"),
        });
    }
    if let Some(target) = update.budget_item_id {
        require_budget_item_exists(&txn, target).await?;
    }

    let allocated = update
        .total_budget_allocated
        .unwrap_or(before.total_budget_allocated);
    let utilized = update
        .total_budget_utilized
        .unwrap_or(before.total_budget_utilized);

    let mut active: project::ActiveModel = before.clone().into();
    if let Some(parent) = update.budget_item_id {
        active.budget_item_id = Set(parent);
    }
    if let Some(name) = update.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(office) = update.implementing_office {
        active.implementing_office = Set(office.trim().to_string());
    }
    if let Some(obligated) = update.obligated_budget {
        active.obligated_budget = Set(obligated);
    }
    if let Some(date) = update.target_date_completion {
        active.target_date_completion = Set(date);
    }
    if let Some(manager) = update.project_manager_id {
        active.project_manager_id = Set(manager);
    }
    if let Some(remarks) = update.remarks {
        active.remarks = Set(remarks);
    }
    active.total_budget_allocated = Set(allocated);
    active.total_budget_utilized = Set(utilized);
    active.utilization_rate = Set(utilization_rate(allocated, utilized));
    active.updated_by = Set(Some(actor_id));
    active.updated_at = Set(Some(Utc::now()));
    let after = active.update(&txn).await?;

    activity::log(
        &txn,
        actor_id,
        LogConfig::with_change(
            ActivityAction::Updated,
            RecordSnapshot::Project(before.clone()),
            RecordSnapshot::Project(after.clone()),
        )
        .reason(reason),
    )
    .await?;

    for parent in affected_parents(before.budget_item_id, after.budget_item_id) {
        budget_item::recompute(&txn, parent, actor_id).await?;
    }

    txn.commit().await?;
    Ok(after)
}

/// Budget items to recompute after a project moved from `old` to `new`.
fn affected_parents(old: Option<i64>, new: Option<i64>) -> Vec<i64> {
    match (old, new) {
        (Some(a), Some(b)) if a == b => vec![a],
        (old, new) => old.into_iter().chain(new).collect(),
    }
}

/// Permanently removes a project.
///
/// The project must have no active breakdowns (trash it first); any
/// soft-deleted breakdowns left behind are hard-deleted before the project.
/// Audit entries carry the snapshots read before removal.
#[instrument(skip(db, permissions, reason))]
pub async fn delete_project(
    db: &DatabaseConnection,
    project_id: i64,
    actor_id: i64,
    permissions: &dyn PermissionCheck,
    reason: Option<String>,
) -> Result<()> {
    let txn = db.begin().await?;
    let project = require_project(&txn, project_id).await?;

    if !permissions.can_hard_delete(actor_id, &project) {
        return Err(Error::PermissionDenied {
            message: format!("User {actor_id} may not delete project {project_id}"),
        });
    }

    let children = ProjectBreakdown::find()
        .filter(project_breakdown::Column::ProjectId.eq(project_id))
        .order_by_asc(project_breakdown::Column::Id)
        .all(&txn)
        .await?;

    let active_children = children.iter().filter(|b| !b.is_deleted).count() as u64;
    if active_children > 0 {
        return Err(Error::PreconditionFailed {
            message: format!(
                "Cannot delete project with {active_children} active breakdown(s); move it to trash first"
            ),
            blocking: active_children,
        });
    }

    if !children.is_empty() {
        ProjectBreakdown::delete_many()
            .filter(project_breakdown::Column::ProjectId.eq(project_id))
            .exec(&txn)
            .await?;

        let records = children
            .into_iter()
            .map(|b| BulkLogRecord {
                target_type: TargetType::Breakdown,
                target_id: None,
                previous: Some(RecordSnapshot::Breakdown(b)),
                new: None,
                identity: Some(TargetIdentity {
                    name: Some(project.name.clone()),
                    office: Some(project.implementing_office.clone()),
                    location: None,
                }),
            })
            .collect();
        activity::log_bulk(
            &txn,
            actor_id,
            ActivityAction::BulkDeleted,
            records,
            BulkOptions {
                source: LogSource::System,
                reason: Some(format!("Cascade from deleting project {project_id}")),
            },
        )
        .await?;
    }

    Project::delete_by_id(project_id).exec(&txn).await?;

    activity::log(
        &txn,
        actor_id,
        LogConfig::with_snapshot(ActivityAction::Deleted, RecordSnapshot::Project(project.clone()))
            .reason(reason),
    )
    .await?;

    if let Some(parent) = project.budget_item_id {
        budget_item::recompute(&txn, parent, actor_id).await?;
    }

    txn.commit().await?;
    info!("Deleted project {}", project_id);
    Ok(())
}

/// Recomputes a project's status and counts from its active breakdowns,
/// then its budget item.
#[instrument(skip(db))]
pub async fn recompute<C>(db: &C, project_id: i64, actor_id: i64) -> Result<project::Model>
where
    C: ConnectionTrait,
{
    let project = recompute_own(db, project_id, actor_id).await?;
    if let Some(parent) = project.budget_item_id {
        budget_item::recompute(db, parent, actor_id).await?;
    }
    Ok(project)
}

/// Recomputes the project alone, leaving its budget item to the caller.
pub(crate) async fn recompute_own<C>(
    db: &C,
    project_id: i64,
    actor_id: i64,
) -> Result<project::Model>
where
    C: ConnectionTrait,
{
    use project::Column;

    for attempt in 1..=RECOMPUTE_ATTEMPTS {
        let project = require_project(db, project_id).await?;

        let breakdowns = ProjectBreakdown::find()
            .filter(project_breakdown::Column::ProjectId.eq(project_id))
            .filter(project_breakdown::Column::IsDeleted.eq(false))
            .order_by_asc(project_breakdown::Column::Id)
            .all(db)
            .await?;

        let counts = StatusCounts::from_breakdowns(&breakdowns);
        let status = counts.derive_status();

        let result = Project::update_many()
            .col_expr(Column::Status, Expr::value(status.as_str()))
            .col_expr(Column::ProjectCompleted, Expr::value(counts.completed))
            .col_expr(Column::ProjectDelayed, Expr::value(counts.delayed))
            .col_expr(Column::ProjectsOnTrack, Expr::value(counts.on_track))
            .col_expr(Column::UpdatedBy, Expr::value(Some(actor_id)))
            .col_expr(Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .col_expr(
                Column::AggregateVersion,
                Expr::col(Column::AggregateVersion).add(1),
            )
            .filter(Column::Id.eq(project_id))
            .filter(Column::AggregateVersion.eq(project.aggregate_version))
            .exec(db)
            .await?;

        if result.rows_affected == 1 {
            debug!(
                "Project {} rolled up from {} active breakdown(s): status {}",
                project_id,
                breakdowns.len(),
                status
            );
            return require_project(db, project_id).await;
        }

        warn!(
            "Project {} changed during recompute (attempt {}), retrying",
            project_id, attempt
        );
    }

    Err(Error::ConcurrentModification {
        entity: "project",
        id: project_id,
    })
}

fn project_failure(id: i64, error: Error) -> RecomputeFailure {
    RecomputeFailure {
        target_type: TargetType::Project,
        id,
        error,
    }
}

/// Recomputes several projects independently, then each distinct parent once.
/// Under `FailurePolicy::Continue` parent failures land in the same report.
pub async fn recompute_many<C>(
    db: &C,
    ids: &[i64],
    actor_id: i64,
    policy: FailurePolicy,
) -> Result<RecomputeReport>
where
    C: ConnectionTrait,
{
    let mut report = RecomputeReport::default();
    let mut parents = BTreeSet::new();

    for &id in ids {
        match recompute_own(db, id, actor_id).await {
            Ok(project) => {
                parents.extend(project.budget_item_id);
                report.recomputed.push(id);
            }
            Err(e) if policy == FailurePolicy::Continue => {
                warn!("Recompute of project {} failed: {}", id, e);
                report.failures.push(project_failure(id, e));
            }
            Err(e) => return Err(e),
        }
    }

    let parents: Vec<i64> = parents.into_iter().collect();
    let parent_report = budget_item::recompute_many(db, &parents, actor_id, policy).await?;
    report.failures.extend(parent_report.failures);

    Ok(report)
}

/// Recomputes every active project of a budget item, then the budget item.
pub async fn recompute_for_budget_item<C>(
    db: &C,
    budget_item_id: i64,
    actor_id: i64,
) -> Result<RecomputeReport>
where
    C: ConnectionTrait,
{
    let ids: Vec<i64> = get_active_projects_for_budget_item(db, budget_item_id)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    let mut report = RecomputeReport::default();
    for id in ids {
        recompute_own(db, id, actor_id).await?;
        report.recomputed.push(id);
    }
    budget_item::recompute(db, budget_item_id, actor_id).await?;
    Ok(report)
}

/// Recomputes every active project and then every budget item.
pub async fn recompute_all<C>(db: &C, actor_id: i64) -> Result<RecomputeReport>
where
    C: ConnectionTrait,
{
    let ids: Vec<i64> = Project::find()
        .filter(project::Column::IsDeleted.eq(false))
        .order_by_asc(project::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    info!("Recomputing {} active project(s)", ids.len());
    let mut report = RecomputeReport::default();
    for id in ids {
        match recompute_own(db, id, actor_id).await {
            Ok(_) => report.recomputed.push(id),
            Err(e) => {
                warn!("Recompute of project {} failed: {}", id, e);
                report.failures.push(project_failure(id, e));
            }
        }
    }

    let items = budget_item::recompute_all(db, actor_id).await?;
    report.failures.extend(items.failures);
    Ok(report)
}
