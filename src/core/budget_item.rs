//! Budget item business logic - CRUD plus the budget-level aggregator.
//!
//! A budget item's derived fields (obligated and utilized totals, utilization
//! rate, status and per-status project counts) are recomputed from its
//! non-deleted projects whenever one of them changes. Recompute writes are
//! guarded by `aggregate_version`: the update only lands if nobody else wrote
//! the row since it was read, otherwise the children are re-read and the
//! rollup is computed again.

use crate::{
    core::{
        activity::{self, ActivityAction, LogConfig},
        rollup::{BudgetRollup, RECOMPUTE_ATTEMPTS, RollupStatus, validate_amount},
        snapshot::{RecordSnapshot, TargetType},
    },
    entities::{BudgetItem, Project, budget_item, project},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{debug, info, instrument, warn};

/// Whether a multi-id recompute stops at the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Return the first error
    #[default]
    Abort,
    /// Record the error against its id and keep going
    Continue,
}

/// A record that could not be recomputed.
#[derive(Debug)]
pub struct RecomputeFailure {
    /// Kind of record that failed
    pub target_type: TargetType,
    /// Id of the record that failed
    pub id: i64,
    /// Why it failed
    pub error: Error,
}

/// Outcome of a multi-id recompute.
#[derive(Debug, Default)]
pub struct RecomputeReport {
    /// Ids recomputed successfully, in order
    pub recomputed: Vec<i64>,
    /// Every failure, including those of parent records recomputed along the way
    pub failures: Vec<RecomputeFailure>,
}

impl RecomputeReport {
    /// True when every id was recomputed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Editable budget item fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct BudgetItemUpdate {
    /// New unique name
    pub name: Option<String>,
    /// New description, `Some(None)` clears it
    pub description: Option<Option<String>>,
    /// New allocation
    pub total_budget_allocated: Option<f64>,
}

/// Retrieves a budget item by id.
pub async fn get_budget_item_by_id<C>(db: &C, id: i64) -> Result<Option<budget_item::Model>>
where
    C: ConnectionTrait,
{
    BudgetItem::find_by_id(id).one(db).await.map_err(Into::into)
}

/// Finds a budget item by its unique name.
pub async fn get_budget_item_by_name<C>(db: &C, name: &str) -> Result<Option<budget_item::Model>>
where
    C: ConnectionTrait,
{
    BudgetItem::find()
        .filter(budget_item::Column::Name.eq(name))
        .one(db)
        .await
        .map_err(Into::into)
}

/// All budget items, ordered alphabetically by name.
pub async fn get_all_budget_items<C>(db: &C) -> Result<Vec<budget_item::Model>>
where
    C: ConnectionTrait,
{
    BudgetItem::find()
        .order_by_asc(budget_item::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn require_budget_item<C>(db: &C, id: i64) -> Result<budget_item::Model>
where
    C: ConnectionTrait,
{
    get_budget_item_by_id(db, id)
        .await?
        .ok_or(Error::BudgetItemNotFound { id })
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation {
            message: "Budget item name cannot be empty".to_string(),
        });
    }
    Ok(name.to_string())
}

async fn ensure_name_free<C>(db: &C, name: &str, except: Option<i64>) -> Result<()>
where
    C: ConnectionTrait,
{
    match get_budget_item_by_name(db, name).await? {
        Some(existing) if Some(existing.id) != except => Err(Error::Validation {
            message: format!("A budget item named '{name}' already exists"),
        }),
        _ => Ok(()),
    }
}

/// Creates a budget item with all derived fields zeroed and status ongoing.
#[instrument(skip(db, description, reason))]
pub async fn create_budget_item(
    db: &DatabaseConnection,
    actor_id: i64,
    name: &str,
    total_budget_allocated: f64,
    description: Option<String>,
    reason: Option<String>,
) -> Result<budget_item::Model> {
    let name = validate_name(name)?;
    validate_amount(total_budget_allocated)?;

    let txn = db.begin().await?;
    ensure_name_free(&txn, &name, None).await?;

    let item = budget_item::ActiveModel {
        name: Set(name),
        description: Set(description),
        total_budget_allocated: Set(total_budget_allocated),
        obligated_budget: Set(0.0),
        total_budget_utilized: Set(0.0),
        utilization_rate: Set(0.0),
        status: Set(RollupStatus::Ongoing.as_str().to_string()),
        project_completed: Set(0),
        project_delayed: Set(0),
        projects_on_track: Set(0),
        aggregate_version: Set(0),
        created_by: Set(actor_id),
        created_at: Set(Utc::now()),
        updated_by: Set(None),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    activity::log(
        &txn,
        actor_id,
        LogConfig::with_snapshot(ActivityAction::Created, RecordSnapshot::BudgetItem(item.clone()))
            .reason(reason),
    )
    .await?;

    txn.commit().await?;
    info!("Created budget item {} ({})", item.id, item.name);
    Ok(item)
}

/// Edits a budget item. A changed allocation triggers a recompute, since the
/// utilization rate is measured against it.
#[instrument(skip(db, update, reason))]
pub async fn update_budget_item(
    db: &DatabaseConnection,
    id: i64,
    actor_id: i64,
    update: BudgetItemUpdate,
    reason: Option<String>,
) -> Result<budget_item::Model> {
    if let Some(amount) = update.total_budget_allocated {
        validate_amount(amount)?;
    }
    let new_name = update.name.as_deref().map(validate_name).transpose()?;

    let txn = db.begin().await?;
    let before = require_budget_item(&txn, id).await?;

    if let Some(name) = &new_name {
        ensure_name_free(&txn, name, Some(id)).await?;
    }

    let allocation_changed = update
        .total_budget_allocated
        .is_some_and(|amount| amount.to_bits() != before.total_budget_allocated.to_bits());

    let mut active: budget_item::ActiveModel = before.clone().into();
    if let Some(name) = new_name {
        active.name = Set(name);
    }
    if let Some(description) = update.description {
        active.description = Set(description);
    }
    if let Some(amount) = update.total_budget_allocated {
        active.total_budget_allocated = Set(amount);
    }
    active.updated_by = Set(Some(actor_id));
    active.updated_at = Set(Some(Utc::now()));
    let after = active.update(&txn).await?;

    activity::log(
        &txn,
        actor_id,
        LogConfig::with_change(
            ActivityAction::Updated,
            RecordSnapshot::BudgetItem(before),
            RecordSnapshot::BudgetItem(after.clone()),
        )
        .reason(reason),
    )
    .await?;

    let after = if allocation_changed {
        recompute(&txn, id, actor_id).await?
    } else {
        after
    };

    txn.commit().await?;
    Ok(after)
}

/// Deletes a budget item. Blocked while any project, trashed or not, still
/// references it.
#[instrument(skip(db, reason))]
pub async fn delete_budget_item(
    db: &DatabaseConnection,
    id: i64,
    actor_id: i64,
    reason: Option<String>,
) -> Result<()> {
    let txn = db.begin().await?;
    let item = require_budget_item(&txn, id).await?;

    let linked = Project::find()
        .filter(project::Column::BudgetItemId.eq(id))
        .count(&txn)
        .await?;
    if linked > 0 {
        return Err(Error::PreconditionFailed {
            message: format!("Cannot delete budget item with {linked} linked project(s)"),
            blocking: linked,
        });
    }

    BudgetItem::delete_by_id(id).exec(&txn).await?;

    activity::log(
        &txn,
        actor_id,
        LogConfig::with_snapshot(ActivityAction::Deleted, RecordSnapshot::BudgetItem(item)).reason(reason),
    )
    .await?;

    txn.commit().await?;
    info!("Deleted budget item {}", id);
    Ok(())
}

/// Recomputes a budget item's derived fields from its active projects.
///
/// Runs against whatever connection it is given; mutations pass their open
/// transaction so the recompute sees their writes.
#[instrument(skip(db))]
pub async fn recompute<C>(db: &C, budget_item_id: i64, actor_id: i64) -> Result<budget_item::Model>
where
    C: ConnectionTrait,
{
    for attempt in 1..=RECOMPUTE_ATTEMPTS {
        let item = require_budget_item(db, budget_item_id).await?;

        let projects = Project::find()
            .filter(project::Column::BudgetItemId.eq(budget_item_id))
            .filter(project::Column::IsDeleted.eq(false))
            .order_by_asc(project::Column::Id)
            .all(db)
            .await?;

        let rollup = BudgetRollup::from_projects(item.total_budget_allocated, &projects);

        if write_rollup(db, &item, &rollup, actor_id).await? {
            debug!(
                "Budget item {} rolled up from {} active project(s): status {}",
                budget_item_id,
                projects.len(),
                rollup.status
            );
            return require_budget_item(db, budget_item_id).await;
        }

        warn!(
            "Budget item {} changed during recompute (attempt {}), retrying",
            budget_item_id, attempt
        );
    }

    Err(Error::ConcurrentModification {
        entity: "budget item",
        id: budget_item_id,
    })
}

async fn write_rollup<C>(
    db: &C,
    item: &budget_item::Model,
    rollup: &BudgetRollup,
    actor_id: i64,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    use budget_item::Column;

    let result = BudgetItem::update_many()
        .col_expr(Column::ObligatedBudget, Expr::value(rollup.obligated))
        .col_expr(Column::TotalBudgetUtilized, Expr::value(rollup.utilized))
        .col_expr(Column::UtilizationRate, Expr::value(rollup.utilization_rate))
        .col_expr(Column::Status, Expr::value(rollup.status.as_str()))
        .col_expr(Column::ProjectCompleted, Expr::value(rollup.counts.completed))
        .col_expr(Column::ProjectDelayed, Expr::value(rollup.counts.delayed))
        .col_expr(Column::ProjectsOnTrack, Expr::value(rollup.counts.on_track))
        .col_expr(Column::UpdatedBy, Expr::value(Some(actor_id)))
        .col_expr(Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .col_expr(
            Column::AggregateVersion,
            Expr::col(Column::AggregateVersion).add(1),
        )
        .filter(Column::Id.eq(item.id))
        .filter(Column::AggregateVersion.eq(item.aggregate_version))
        .exec(db)
        .await?;

    Ok(result.rows_affected == 1)
}

/// Recomputes several budget items, each independently.
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

    for &id in ids {
        match recompute(db, id, actor_id).await {
            Ok(_) => report.recomputed.push(id),
            Err(e) if policy == FailurePolicy::Continue => {
                warn!("Recompute of budget item {} failed: {}", id, e);
                report.failures.push(RecomputeFailure {
                    target_type: TargetType::BudgetItem,
                    id,
                    error: e,
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

/// Recomputes every budget item. This is the repair pass for derived fields
/// that drifted.
pub async fn recompute_all<C>(db: &C, actor_id: i64) -> Result<RecomputeReport>
where
    C: ConnectionTrait,
{
    let ids: Vec<i64> = get_all_budget_items(db).await?.into_iter().map(|b| b.id).collect();
    info!("Recomputing {} budget item(s)", ids.len());
    recompute_many(db, &ids, actor_id, FailurePolicy::Continue).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::{
        core::{
            activity::{ActivityEntryExt, logs_for_target},
            project::{ProjectUpdate, update_project},
        },
        test_utils::*,
    };
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_create_budget_item_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = create_budget_item(&db, 1, "   ", 100.0, None, None).await;
        assert!(matches!(result.unwrap_err(), Error::Validation { message: _ }));

        let result = create_budget_item(&db, 1, "Fund", -5.0, None, None).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: -5.0 }));

        let result = create_budget_item(&db, 1, "Fund", f64::NAN, None, None).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: _ }));

        Ok(())
    }

    #[tokio::test]
    async fn test_create_budget_item_starts_zeroed() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Planner").await?;
        let item = create_test_budget_item(&db, user.id, "Road Fund", 1_000_000.0).await?;

        assert_eq!(item.obligated_budget, 0.0);
        assert_eq!(item.total_budget_utilized, 0.0);
        assert_eq!(item.utilization_rate, 0.0);
        assert_eq!(item.status, "ongoing");
        assert_eq!(item.projects_on_track, 0);

        let history = logs_for_target(&db, TargetType::BudgetItem, item.id).await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, "created");

        let duplicate = create_budget_item(&db, user.id, "Road Fund", 5.0, None, None).await;
        assert!(matches!(duplicate, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_with_unknown_actor_rolls_back() -> Result<()> {
        let db = setup_test_db().await?;
        let result = create_budget_item(&db, 42, "Ghost Fund", 10.0, None, None).await;
        assert!(matches!(result, Err(Error::ActorNotFound { id: 42 })));
        assert!(get_budget_item_by_name(&db, "Ghost Fund").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_with_no_projects() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Planner").await?;
        let item = create_test_budget_item(&db, user.id, "Empty Fund", 0.0).await?;

        let item = recompute(&db, item.id, user.id).await?;
        assert_eq!(item.utilization_rate, 0.0);
        assert_eq!(item.status, "ongoing");
        assert_eq!(
            (item.project_completed, item.project_delayed, item.projects_on_track),
            (0, 0, 0)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_sums_active_projects() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Planner").await?;
        let item = create_test_budget_item(&db, user.id, "Bridge Fund", 100_000.0).await?;

        create_custom_project(&db, user.id, Some(item.id), "Bridge A", 60_000.0, 50_000.0, 45_000.0).await?;
        create_custom_project(&db, user.id, Some(item.id), "Bridge B", 40_000.0, 35_000.0, 30_000.0).await?;

        let item = recompute(&db, item.id, user.id).await?;
        assert_eq!(item.obligated_budget, 85_000.0);
        assert_eq!(item.total_budget_utilized, 75_000.0);
        assert_eq!(item.utilization_rate, 75.0);
        assert_eq!(item.projects_on_track, 2);
        assert_eq!(item.status, "ongoing");
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Planner").await?;
        let item = create_test_budget_item(&db, user.id, "School Fund", 300.0).await?;
        create_custom_project(&db, user.id, Some(item.id), "Classrooms", 200.0, 150.0, 120.0).await?;

        let first = recompute(&db, item.id, user.id).await?;
        let second = recompute(&db, item.id, user.id).await?;

        assert_eq!(first.obligated_budget.to_bits(), second.obligated_budget.to_bits());
        assert_eq!(first.total_budget_utilized.to_bits(), second.total_budget_utilized.to_bits());
        assert_eq!(first.utilization_rate.to_bits(), second.utilization_rate.to_bits());
        assert_eq!(first.status, second.status);
        assert_eq!(
            (first.project_completed, first.project_delayed, first.projects_on_track),
            (second.project_completed, second.project_delayed, second.projects_on_track)
        );
        assert_eq!(second.aggregate_version, first.aggregate_version + 1);
        Ok(())
    }

    fn item_at_version(aggregate_version: i64) -> budget_item::Model {
        budget_item::Model {
            id: 5,
            name: "Contested Fund".to_string(),
            description: None,
            total_budget_allocated: 100.0,
            obligated_budget: 0.0,
            total_budget_utilized: 0.0,
            utilization_rate: 0.0,
            status: "ongoing".to_string(),
            project_completed: 0,
            project_delayed: 0,
            projects_on_track: 0,
            aggregate_version,
            created_by: 1,
            created_at: Utc::now(),
            updated_by: None,
            updated_at: None,
        }
    }

    fn mock_attempt(db: MockDatabase, version: i64, rows_affected: u64) -> MockDatabase {
        db.append_query_results([vec![item_at_version(version)]])
            .append_query_results([Vec::<project::Model>::new()])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected,
            }])
    }

    #[tokio::test]
    async fn test_stale_version_write_is_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Planner").await?;
        let stale = create_test_budget_item(&db, user.id, "Raced Fund", 100.0).await?;

        // Another writer lands first and bumps the version
        let current = recompute(&db, stale.id, user.id).await?;
        assert_eq!(current.aggregate_version, stale.aggregate_version + 1);

        let rollup = BudgetRollup::from_projects(stale.total_budget_allocated, &[]);
        assert!(!write_rollup(&db, &stale, &rollup, user.id).await?);
        assert!(write_rollup(&db, &current, &rollup, user.id).await?);

        let item = get_budget_item_by_id(&db, stale.id).await?.unwrap();
        assert_eq!(item.aggregate_version, current.aggregate_version + 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_retries_after_conflict() -> Result<()> {
        let mock = mock_attempt(MockDatabase::new(DatabaseBackend::Sqlite), 0, 0);
        let db = mock_attempt(mock, 1, 1)
            .append_query_results([vec![item_at_version(2)]])
            .into_connection();

        let item = recompute(&db, 5, 1).await?;
        assert_eq!(item.aggregate_version, 2);
        assert_eq!(db.into_transaction_log().len(), 7);
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_gives_up_after_repeated_conflicts() -> Result<()> {
        let mut mock = MockDatabase::new(DatabaseBackend::Sqlite);
        for version in 0..i64::from(RECOMPUTE_ATTEMPTS) {
            mock = mock_attempt(mock, version, 0);
        }
        let db = mock.into_connection();

        let result = recompute(&db, 5, 1).await;
        assert!(matches!(
            result,
            Err(Error::ConcurrentModification {
                entity: "budget item",
                id: 5
            })
        ));
        assert_eq!(db.into_transaction_log().len(), 3 * RECOMPUTE_ATTEMPTS as usize);
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_missing_budget_item() -> Result<()> {
        let db = setup_test_db().await?;
        let result = recompute(&db, 77, 1).await;
        assert!(matches!(result, Err(Error::BudgetItemNotFound { id: 77 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_many_policies() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Planner").await?;
        let a = create_test_budget_item(&db, user.id, "A", 1.0).await?;
        let b = create_test_budget_item(&db, user.id, "B", 1.0).await?;

        let report = recompute_many(&db, &[a.id, 999, b.id], user.id, FailurePolicy::Continue).await?;
        assert_eq!(report.recomputed, vec![a.id, b.id]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, 999);
        assert_eq!(report.failures[0].target_type, TargetType::BudgetItem);
        assert!(!report.is_clean());

        let aborted = recompute_many(&db, &[a.id, 999, b.id], user.id, FailurePolicy::Abort).await;
        assert!(matches!(aborted, Err(Error::BudgetItemNotFound { id: 999 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_recompute_all_repairs_drift() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Planner").await?;
        let item = create_test_budget_item(&db, user.id, "Drifted", 1000.0).await?;
        create_custom_project(&db, user.id, Some(item.id), "P", 1000.0, 500.0, 250.0).await?;

        BudgetItem::update_many()
            .col_expr(budget_item::Column::TotalBudgetUtilized, Expr::value(9_999.0))
            .filter(budget_item::Column::Id.eq(item.id))
            .exec(&db)
            .await?;

        let report = recompute_all(&db, user.id).await?;
        assert!(report.is_clean());
        let repaired = get_budget_item_by_id(&db, item.id).await?.unwrap();
        assert_eq!(repaired.total_budget_utilized, 250.0);
        assert_eq!(repaired.utilization_rate, 25.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_allocation_change_recomputes_rate() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Planner").await?;
        let item = create_test_budget_item(&db, user.id, "Water Fund", 1000.0).await?;
        create_custom_project(&db, user.id, Some(item.id), "Pumps", 500.0, 500.0, 500.0).await?;

        let updated = update_budget_item(
            &db,
            item.id,
            user.id,
            BudgetItemUpdate {
                total_budget_allocated: Some(2000.0),
                ..Default::default()
            },
            Some("Realignment".to_string()),
        )
        .await?;
        assert_eq!(updated.total_budget_allocated, 2000.0);
        assert_eq!(updated.utilization_rate, 25.0);

        let history = logs_for_target(&db, TargetType::BudgetItem, item.id).await?;
        let last = history.last().unwrap();
        assert_eq!(last.action, "updated");
        assert_eq!(last.changed_field_names()?, vec!["total_budget_allocated"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_blocked_by_linked_projects() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Planner").await?;
        let item = create_test_budget_item(&db, user.id, "Busy Fund", 100.0).await?;
        let project = create_custom_project(&db, user.id, Some(item.id), "Busy", 10.0, 5.0, 5.0).await?;
        let before = get_budget_item_by_id(&db, item.id).await?.unwrap();

        let result = delete_budget_item(&db, item.id, user.id, None).await;
        match result {
            Err(Error::PreconditionFailed { message, blocking }) => {
                assert_eq!(blocking, 1);
                assert_eq!(message, "Cannot delete budget item with 1 linked project(s)");
            }
            other => panic!("expected precondition failure, got {other:?}"),
        }

        assert_eq!(get_budget_item_by_id(&db, item.id).await?.unwrap(), before);
        let still_linked = Project::find_by_id(project.id).one(&db).await?.unwrap();
        assert_eq!(still_linked, project);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_unlinked_budget_item() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Planner").await?;
        let item = create_test_budget_item(&db, user.id, "Spare Fund", 100.0).await?;
        let project = create_custom_project(&db, user.id, Some(item.id), "Moved", 10.0, 5.0, 5.0).await?;

        update_project(
            &db,
            project.id,
            user.id,
            ProjectUpdate {
                budget_item_id: Some(None),
                ..Default::default()
            },
            None,
        )
        .await?;

        delete_budget_item(&db, item.id, user.id, Some("Closed".to_string())).await?;
        assert!(get_budget_item_by_id(&db, item.id).await?.is_none());

        let history = logs_for_target(&db, TargetType::BudgetItem, item.id).await?;
        let last = history.last().unwrap();
        assert_eq!(last.action, "deleted");
        assert!(last.previous_values.is_some());
        assert_eq!(last.target_name.as_deref(), Some("Spare Fund"));
        Ok(())
    }
}
