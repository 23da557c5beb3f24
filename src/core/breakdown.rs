//! Breakdown business logic - the leaf mutations of the hierarchy.
//!
//! Each breakdown write is logged and then rolled up into its project and the
//! project's budget item in the same transaction. Bulk variants process their
//! records in order, skip records whose id or project is missing, and roll up
//! each touched project once after all writes are done.

use crate::{
    core::{
        activity::{self, ActivityAction, BulkLogRecord, BulkOptions, LogConfig, LogSource},
        budget_item::{self, FailurePolicy},
        project::{self, NewProject, require_project},
        rollup::{BreakdownStatus, validate_amount},
        snapshot::{RecordSnapshot, TargetIdentity, TargetType, location_label},
    },
    entities::{ProjectBreakdown, project as project_entity, project_breakdown},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{DatabaseTransaction, QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, instrument, warn};

/// Report fields of a breakdown row.
#[derive(Debug, Clone, Default)]
pub struct BreakdownFields {
    /// Date the report refers to
    pub report_date: Date,
    /// Legislative district
    pub district: Option<String>,
    /// Municipality or city
    pub municipality: Option<String>,
    /// Barangay
    pub barangay: Option<String>,
    /// Appropriated amount
    pub appropriation: f64,
    /// Obligated amount
    pub obligation: f64,
    /// Remaining balance, may be negative
    pub balance: f64,
    /// Physical accomplishment in percent
    pub accomplishment_rate: f64,
    /// Free-form status text, normalized on write
    pub status: Option<String>,
    /// Notes
    pub remarks: Option<String>,
}

/// A breakdown to create under an existing project.
#[derive(Debug, Clone)]
pub struct NewBreakdown {
    /// Owning project
    pub project_id: i64,
    /// Report fields
    pub fields: BreakdownFields,
}

/// Editable breakdown fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct BreakdownUpdate {
    /// New report date
    pub report_date: Option<Date>,
    /// New district, `Some(None)` clears it
    pub district: Option<Option<String>>,
    /// New municipality
    pub municipality: Option<Option<String>>,
    /// New barangay
    pub barangay: Option<Option<String>>,
    /// New appropriation
    pub appropriation: Option<f64>,
    /// New obligation
    pub obligation: Option<f64>,
    /// New balance
    pub balance: Option<f64>,
    /// New accomplishment rate
    pub accomplishment_rate: Option<f64>,
    /// New status text, normalized on write
    pub status: Option<Option<String>>,
    /// New remarks
    pub remarks: Option<Option<String>>,
}

/// The project an ingested row belongs to, identified by name and office.
#[derive(Debug, Clone)]
pub struct IngestTarget {
    /// Project name to match
    pub project_name: String,
    /// Implementing office to match
    pub implementing_office: String,
    /// Budget item for the project if it has to be created
    pub budget_item_id: Option<i64>,
}

/// A record a bulk operation could not apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Position in the input
    pub index: usize,
    /// Breakdown or project id that was missing
    pub id: i64,
    /// Why it was skipped
    pub reason: String,
}

/// Result of a bulk operation. Callers compare `count` against their input
/// to detect skips.
#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    /// Shared batch id of the audit entries, absent when nothing was applied
    pub batch_id: Option<String>,
    /// Number of records applied
    pub count: usize,
    /// Ids of the applied breakdowns, in input order
    pub ids: Vec<i64>,
    /// Records that were skipped
    pub skipped: Vec<SkippedRecord>,
}

/// Retrieves a breakdown by id, deleted or not.
pub async fn get_breakdown_by_id<C>(db: &C, id: i64) -> Result<Option<project_breakdown::Model>>
where
    C: ConnectionTrait,
{
    ProjectBreakdown::find_by_id(id).one(db).await.map_err(Into::into)
}

/// A project's active breakdowns as a time series, oldest report first.
pub async fn get_ledger<C>(db: &C, project_id: i64) -> Result<Vec<project_breakdown::Model>>
where
    C: ConnectionTrait,
{
    ProjectBreakdown::find()
        .filter(project_breakdown::Column::ProjectId.eq(project_id))
        .filter(project_breakdown::Column::IsDeleted.eq(false))
        .order_by_asc(project_breakdown::Column::ReportDate)
        .order_by_asc(project_breakdown::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn require_breakdown<C>(db: &C, id: i64) -> Result<project_breakdown::Model>
where
    C: ConnectionTrait,
{
    get_breakdown_by_id(db, id)
        .await?
        .ok_or(Error::BreakdownNotFound { id })
}

fn normalize_status(status: Option<&str>) -> Result<Option<String>> {
    status
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(BreakdownStatus::normalize)
        .transpose()
}

fn validate_rate(rate: f64) -> Result<()> {
    if rate.is_finite() && (0.0..=100.0).contains(&rate) {
        Ok(())
    } else {
        Err(Error::Validation {
            message: format!("Accomplishment rate must be between 0 and 100, got {rate}"),
        })
    }
}

/// Validates and normalizes report fields.
fn prepare_fields(mut fields: BreakdownFields) -> Result<BreakdownFields> {
    validate_amount(fields.appropriation)?;
    validate_amount(fields.obligation)?;
    if !fields.balance.is_finite() {
        return Err(Error::InvalidAmount {
            amount: fields.balance,
        });
    }
    validate_rate(fields.accomplishment_rate)?;
    fields.status = normalize_status(fields.status.as_deref())?;
    Ok(fields)
}

fn prepare_update(mut update: BreakdownUpdate) -> Result<BreakdownUpdate> {
    for amount in [update.appropriation, update.obligation].into_iter().flatten() {
        validate_amount(amount)?;
    }
    if let Some(balance) = update.balance.filter(|b| !b.is_finite()) {
        return Err(Error::InvalidAmount { amount: balance });
    }
    if let Some(rate) = update.accomplishment_rate {
        validate_rate(rate)?;
    }
    if let Some(status) = update.status.take() {
        update.status = Some(normalize_status(status.as_deref())?);
    }
    Ok(update)
}

fn identity_for(project: &project_entity::Model, breakdown: &project_breakdown::Model) -> TargetIdentity {
    TargetIdentity {
        name: Some(project.name.clone()),
        office: Some(project.implementing_office.clone()),
        location: location_label(breakdown),
    }
}

fn require_active_project(project: &project_entity::Model) -> Result<()> {
    if project.is_deleted {
        return Err(Error::Validation {
            message: format!("Project {} is in the trash", project.id),
        });
    }
    Ok(())
}

async fn insert_breakdown<C>(
    db: &C,
    actor_id: i64,
    project_id: i64,
    fields: BreakdownFields,
) -> Result<project_breakdown::Model>
where
    C: ConnectionTrait,
{
    project_breakdown::ActiveModel {
        project_id: Set(project_id),
        report_date: Set(fields.report_date),
        district: Set(fields.district),
        municipality: Set(fields.municipality),
        barangay: Set(fields.barangay),
        appropriation: Set(fields.appropriation),
        obligation: Set(fields.obligation),
        balance: Set(fields.balance),
        accomplishment_rate: Set(fields.accomplishment_rate),
        status: Set(fields.status),
        remarks: Set(fields.remarks),
        is_deleted: Set(false),
        deleted_at: Set(None),
        deleted_by: Set(None),
        trash_event_id: Set(None),
        created_by: Set(actor_id),
        created_at: Set(Utc::now()),
        updated_by: Set(None),
        updated_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

async fn apply_update<C>(
    db: &C,
    actor_id: i64,
    before: project_breakdown::Model,
    update: BreakdownUpdate,
) -> Result<project_breakdown::Model>
where
    C: ConnectionTrait,
{
    let mut active: project_breakdown::ActiveModel = before.into();
    if let Some(date) = update.report_date {
        active.report_date = Set(date);
    }
    if let Some(district) = update.district {
        active.district = Set(district);
    }
    if let Some(municipality) = update.municipality {
        active.municipality = Set(municipality);
    }
    if let Some(barangay) = update.barangay {
        active.barangay = Set(barangay);
    }
    if let Some(appropriation) = update.appropriation {
        active.appropriation = Set(appropriation);
    }
    if let Some(obligation) = update.obligation {
        active.obligation = Set(obligation);
    }
    if let Some(balance) = update.balance {
        active.balance = Set(balance);
    }
    if let Some(rate) = update.accomplishment_rate {
        active.accomplishment_rate = Set(rate);
    }
    if let Some(status) = update.status {
        active.status = Set(status);
    }
    if let Some(remarks) = update.remarks {
        active.remarks = Set(remarks);
    }
    active.updated_by = Set(Some(actor_id));
    active.updated_at = Set(Some(Utc::now()));
    active.update(db).await.map_err(Into::into)
}

async fn soft_delete<C>(
    db: &C,
    actor_id: i64,
    before: project_breakdown::Model,
) -> Result<project_breakdown::Model>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let mut active: project_breakdown::ActiveModel = before.into();
    active.is_deleted = Set(true);
    active.deleted_at = Set(Some(now));
    active.deleted_by = Set(Some(actor_id));
    active.updated_by = Set(Some(actor_id));
    active.updated_at = Set(Some(now));
    active.update(db).await.map_err(Into::into)
}

/// Creates a breakdown row and rolls it up.
#[instrument(skip(db, new, reason), fields(project_id = new.project_id))]
pub async fn create_breakdown(
    db: &DatabaseConnection,
    actor_id: i64,
    new: NewBreakdown,
    reason: Option<String>,
) -> Result<project_breakdown::Model> {
    let fields = prepare_fields(new.fields)?;

    let txn = db.begin().await?;
    let project = require_project(&txn, new.project_id).await?;
    require_active_project(&project)?;

    let breakdown = insert_breakdown(&txn, actor_id, project.id, fields).await?;
    activity::log(
        &txn,
        actor_id,
        LogConfig::with_snapshot(ActivityAction::Created, RecordSnapshot::Breakdown(breakdown.clone()))
            .identity(identity_for(&project, &breakdown))
            .reason(reason),
    )
    .await?;

    project::recompute(&txn, project.id, actor_id).await?;
    txn.commit().await?;
    Ok(breakdown)
}

/// Creates a breakdown for a project identified by name and office, creating
/// the project first when no active one matches.
#[instrument(skip(db, target, fields, reason), fields(project = %target.project_name))]
pub async fn create_breakdown_for_new_project(
    db: &DatabaseConnection,
    actor_id: i64,
    target: IngestTarget,
    fields: BreakdownFields,
    reason: Option<String>,
) -> Result<project_breakdown::Model> {
    let fields = prepare_fields(fields)?;
    if target.project_name.trim().is_empty() || target.implementing_office.trim().is_empty() {
        return Err(Error::Validation {
            message: "Ingested rows need a project name and implementing office".to_string(),
        });
    }

    let txn = db.begin().await?;
    let project = match project::find_active_project(
        &txn,
        target.project_name.trim(),
        target.implementing_office.trim(),
    )
    .await?
    {
        Some(existing) => existing,
        None => {
            info!("Creating project '{}' from ingested breakdown", target.project_name);
            project::insert_project(
                &txn,
                actor_id,
                NewProject {
                    budget_item_id: target.budget_item_id,
                    name: target.project_name,
                    implementing_office: target.implementing_office,
                    total_budget_allocated: fields.appropriation,
                    obligated_budget: fields.obligation,
                    ..Default::default()
                },
                reason.clone(),
                LogSource::BulkImport,
            )
            .await?
        }
    };

    let breakdown = insert_breakdown(&txn, actor_id, project.id, fields).await?;
    activity::log(
        &txn,
        actor_id,
        LogConfig::with_snapshot(ActivityAction::Created, RecordSnapshot::Breakdown(breakdown.clone()))
            .identity(identity_for(&project, &breakdown))
            .source(LogSource::BulkImport)
            .reason(reason),
    )
    .await?;

    project::recompute(&txn, project.id, actor_id).await?;
    txn.commit().await?;
    Ok(breakdown)
}

/// Edits a breakdown row and rolls up its project.
#[instrument(skip(db, update, reason))]
pub async fn update_breakdown(
    db: &DatabaseConnection,
    breakdown_id: i64,
    actor_id: i64,
    update: BreakdownUpdate,
    reason: Option<String>,
) -> Result<project_breakdown::Model> {
    let update = prepare_update(update)?;

    let txn = db.begin().await?;
    let before = require_breakdown(&txn, breakdown_id).await?;
    if before.is_deleted {
        return Err(Error::Validation {
            message: format!("Breakdown {breakdown_id} is deleted"),
        });
    }
    let project = require_project(&txn, before.project_id).await?;

    let after = apply_update(&txn, actor_id, before.clone(), update).await?;
    activity::log(
        &txn,
        actor_id,
        LogConfig::with_change(
            ActivityAction::Updated,
            RecordSnapshot::Breakdown(before),
            RecordSnapshot::Breakdown(after.clone()),
        )
        .identity(identity_for(&project, &after))
        .reason(reason),
    )
    .await?;

    project::recompute(&txn, project.id, actor_id).await?;
    txn.commit().await?;
    Ok(after)
}

/// Soft-deletes a breakdown row and rolls up its project without it.
#[instrument(skip(db, reason))]
pub async fn delete_breakdown(
    db: &DatabaseConnection,
    breakdown_id: i64,
    actor_id: i64,
    reason: Option<String>,
) -> Result<()> {
    let txn = db.begin().await?;
    let before = require_breakdown(&txn, breakdown_id).await?;
    if before.is_deleted {
        return Err(Error::Validation {
            message: format!("Breakdown {breakdown_id} is already deleted"),
        });
    }
    let project = require_project(&txn, before.project_id).await?;

    let after = soft_delete(&txn, actor_id, before.clone()).await?;
    activity::log(
        &txn,
        actor_id,
        LogConfig::with_change(
            ActivityAction::Deleted,
            RecordSnapshot::Breakdown(before),
            RecordSnapshot::Breakdown(after.clone()),
        )
        .identity(identity_for(&project, &after))
        .reason(reason),
    )
    .await?;

    project::recompute(&txn, project.id, actor_id).await?;
    txn.commit().await?;
    Ok(())
}

/// A breakdown a bulk record can apply to. Missing and deleted rows come
/// back as `None` so the record is skipped.
async fn active_breakdown(
    txn: &DatabaseTransaction,
    id: i64,
) -> Result<Option<project_breakdown::Model>> {
    match require_breakdown(txn, id).await {
        Ok(breakdown) => Ok(Some(breakdown).filter(|b| !b.is_deleted)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Per-call bookkeeping shared by the bulk operations.
#[derive(Default)]
struct BulkRun {
    projects: HashMap<i64, project_entity::Model>,
    records: Vec<BulkLogRecord>,
    outcome: BulkOutcome,
}

impl BulkRun {
    /// Active project for `id`, cached; `None` when it is missing or trashed.
    async fn project(
        &mut self,
        txn: &DatabaseTransaction,
        id: i64,
    ) -> Result<Option<project_entity::Model>> {
        if let Some(project) = self.projects.get(&id) {
            return Ok(Some(project.clone()));
        }
        match require_project(txn, id).await {
            Ok(project) if !project.is_deleted => {
                self.projects.insert(id, project.clone());
                Ok(Some(project))
            }
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn skip(&mut self, index: usize, id: i64, reason: String) {
        warn!("Skipping bulk record {} (id {}): {}", index, id, reason);
        self.outcome.skipped.push(SkippedRecord { index, id, reason });
    }

    fn applied(
        &mut self,
        project: &project_entity::Model,
        previous: Option<project_breakdown::Model>,
        new: project_breakdown::Model,
    ) {
        self.outcome.ids.push(new.id);
        self.records.push(BulkLogRecord {
            target_type: TargetType::Breakdown,
            target_id: Some(new.id),
            identity: Some(identity_for(project, &new)),
            previous: previous.map(RecordSnapshot::Breakdown),
            new: Some(RecordSnapshot::Breakdown(new)),
        });
    }

    /// Writes the batch's audit entries, then rolls up each touched project
    /// once and each of their budget items once.
    async fn finish(
        mut self,
        txn: &DatabaseTransaction,
        actor_id: i64,
        action: ActivityAction,
        options: BulkOptions,
    ) -> Result<BulkOutcome> {
        self.outcome.count = self.outcome.ids.len();
        if self.records.is_empty() {
            return Ok(self.outcome);
        }

        let logged = activity::log_bulk(txn, actor_id, action, self.records, options).await?;
        self.outcome.batch_id = Some(logged.batch_id);

        let mut parents = BTreeSet::new();
        let mut touched: Vec<i64> = self.projects.into_keys().collect();
        touched.sort_unstable();
        for id in touched {
            let project = project::recompute_own(txn, id, actor_id).await?;
            parents.extend(project.budget_item_id);
        }
        let parents: Vec<i64> = parents.into_iter().collect();
        budget_item::recompute_many(txn, &parents, actor_id, FailurePolicy::Abort).await?;

        Ok(self.outcome)
    }
}

/// Creates many breakdowns in one transaction. Rows whose project is missing
/// or trashed are skipped.
#[instrument(skip(db, records, options), fields(records = records.len()))]
pub async fn bulk_create(
    db: &DatabaseConnection,
    actor_id: i64,
    records: Vec<NewBreakdown>,
    options: BulkOptions,
) -> Result<BulkOutcome> {
    let records = records
        .into_iter()
        .map(|r| prepare_fields(r.fields).map(|fields| (r.project_id, fields)))
        .collect::<Result<Vec<_>>>()?;

    let txn = db.begin().await?;
    let mut run = BulkRun::default();

    for (index, (project_id, fields)) in records.into_iter().enumerate() {
        let Some(project) = run.project(&txn, project_id).await? else {
            run.skip(index, project_id, format!("Project {project_id} not found"));
            continue;
        };
        let breakdown = insert_breakdown(&txn, actor_id, project_id, fields).await?;
        run.applied(&project, None, breakdown);
    }

    let outcome = run
        .finish(&txn, actor_id, ActivityAction::BulkCreated, options)
        .await?;
    txn.commit().await?;

    info!("Bulk created {} breakdown(s), skipped {}", outcome.count, outcome.skipped.len());
    Ok(outcome)
}

/// Applies many breakdown edits in one transaction. Missing or deleted ids
/// are skipped.
#[instrument(skip(db, updates, options), fields(records = updates.len()))]
pub async fn bulk_update(
    db: &DatabaseConnection,
    actor_id: i64,
    updates: Vec<(i64, BreakdownUpdate)>,
    options: BulkOptions,
) -> Result<BulkOutcome> {
    let updates = updates
        .into_iter()
        .map(|(id, update)| prepare_update(update).map(|u| (id, u)))
        .collect::<Result<Vec<_>>>()?;

    let txn = db.begin().await?;
    let mut run = BulkRun::default();

    for (index, (id, update)) in updates.into_iter().enumerate() {
        let Some(before) = active_breakdown(&txn, id).await? else {
            run.skip(index, id, format!("Breakdown {id} not found"));
            continue;
        };
        let Some(project) = run.project(&txn, before.project_id).await? else {
            run.skip(index, id, format!("Project {} not found", before.project_id));
            continue;
        };
        let after = apply_update(&txn, actor_id, before.clone(), update).await?;
        run.applied(&project, Some(before), after);
    }

    let outcome = run
        .finish(&txn, actor_id, ActivityAction::BulkUpdated, options)
        .await?;
    txn.commit().await?;

    info!("Bulk updated {} breakdown(s), skipped {}", outcome.count, outcome.skipped.len());
    Ok(outcome)
}

/// Soft-deletes many breakdowns in one transaction. Missing or already
/// deleted ids are skipped.
#[instrument(skip(db, ids, options), fields(records = ids.len()))]
pub async fn bulk_delete(
    db: &DatabaseConnection,
    actor_id: i64,
    ids: Vec<i64>,
    options: BulkOptions,
) -> Result<BulkOutcome> {
    let txn = db.begin().await?;
    let mut run = BulkRun::default();

    for (index, id) in ids.into_iter().enumerate() {
        let Some(before) = active_breakdown(&txn, id).await? else {
            run.skip(index, id, format!("Breakdown {id} not found"));
            continue;
        };
        let Some(project) = run.project(&txn, before.project_id).await? else {
            run.skip(index, id, format!("Project {} not found", before.project_id));
            continue;
        };
        let after = soft_delete(&txn, actor_id, before.clone()).await?;
        run.applied(&project, Some(before), after);
    }

    let outcome = run
        .finish(&txn, actor_id, ActivityAction::BulkDeleted, options)
        .await?;
    txn.commit().await?;

    info!("Bulk deleted {} breakdown(s), skipped {}", outcome.count, outcome.skipped.len());
    Ok(outcome)
}
