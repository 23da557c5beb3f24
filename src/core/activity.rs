//! Activity logging - the append-only audit trail.
//!
//! Every mutation in the core writes its audit entries through [`log`] or
//! [`log_bulk`] inside the same database transaction as the change itself.
//! If the actor cannot be resolved the call fails, and with it the mutation;
//! an action is never recorded without an identity.
//!
//! Entries are immutable once written. The only later write is the review
//! annotation set by [`mark_reviewed`].

use crate::{
    core::{
        actor::{ActorSnapshot, resolve_actor},
        diff::{self, ChangeSummary},
        snapshot::{RecordSnapshot, TargetIdentity, TargetType},
    },
    entities::{ActivityLog, activity_log},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*};
use std::fmt;
use tracing::{debug, instrument};

/// What happened to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityAction {
    /// Record created
    Created,
    /// Record edited
    Updated,
    /// Record deleted
    Deleted,
    /// Record restored from the trash
    Restored,
    /// Created as part of a batch
    BulkCreated,
    /// Edited as part of a batch
    BulkUpdated,
    /// Deleted as part of a batch
    BulkDeleted,
    /// Record opened
    Viewed,
    /// Record exported
    Exported,
}

impl ActivityAction {
    /// Name stored in `activity_logs.action`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Restored => "restored",
            Self::BulkCreated => "bulk_created",
            Self::BulkUpdated => "bulk_updated",
            Self::BulkDeleted => "bulk_deleted",
            Self::Viewed => "viewed",
            Self::Exported => "exported",
        }
    }

    // A lone snapshot describes the state before the action for deletions and
    // the state after it for everything else.
    const fn snapshot_is_previous(self) -> bool {
        matches!(self, Self::Deleted | Self::BulkDeleted)
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the action originated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogSource {
    /// Interactive edits
    #[default]
    WebUi,
    /// Spreadsheet or file imports
    BulkImport,
    /// External API callers
    Api,
    /// Work the engine does on its own
    System,
    /// Data migrations
    Migration,
}

impl LogSource {
    /// Name stored in `activity_logs.source`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebUi => "web_ui",
            Self::BulkImport => "bulk_import",
            Self::Api => "api",
            Self::System => "system",
            Self::Migration => "migration",
        }
    }
}

/// Everything [`log`] needs to write one entry.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// What happened
    pub action: ActivityAction,
    /// Kind of record
    pub target_type: TargetType,
    /// Record id, absent once a record is gone
    pub target_id: Option<i64>,
    /// Full record for created/viewed/deleted/exported entries
    pub snapshot: Option<RecordSnapshot>,
    /// Before/after pair for updated/restored entries
    pub change: Option<(RecordSnapshot, RecordSnapshot)>,
    /// Overrides the identity derived from the snapshots
    pub identity: Option<TargetIdentity>,
    /// Free-text justification
    pub reason: Option<String>,
    /// Shared id of a bulk operation
    pub batch_id: Option<String>,
    /// Where the action came from
    pub source: LogSource,
}

impl LogConfig {
    /// Empty config for `action` on a `target_type`.
    pub const fn new(action: ActivityAction, target_type: TargetType) -> Self {
        Self {
            action,
            target_type,
            target_id: None,
            snapshot: None,
            change: None,
            identity: None,
            reason: None,
            batch_id: None,
            source: LogSource::WebUi,
        }
    }

    /// Entry carrying one full snapshot; target type and id come from it.
    #[must_use]
    pub fn with_snapshot(action: ActivityAction, snapshot: RecordSnapshot) -> Self {
        let mut config = Self::new(action, snapshot.kind());
        config.target_id = Some(snapshot.id());
        config.snapshot = Some(snapshot);
        config
    }

    /// Entry carrying a before/after pair; target type and id come from `new`.
    #[must_use]
    pub fn with_change(
        action: ActivityAction,
        previous: RecordSnapshot,
        new: RecordSnapshot,
    ) -> Self {
        let mut config = Self::new(action, new.kind());
        config.target_id = Some(new.id());
        config.change = Some((previous, new));
        config
    }

    #[must_use]
    /// Sets the reason.
    pub fn reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    #[must_use]
    /// Sets the source.
    pub const fn source(mut self, source: LogSource) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    /// Overrides the derived identity.
    pub fn identity(mut self, identity: TargetIdentity) -> Self {
        self.identity = Some(identity);
        self
    }
}

/// One record's part of a bulk operation.
#[derive(Debug, Clone)]
pub struct BulkLogRecord {
    /// Kind of record
    pub target_type: TargetType,
    /// Record id
    pub target_id: Option<i64>,
    /// State before the operation
    pub previous: Option<RecordSnapshot>,
    /// State after the operation
    pub new: Option<RecordSnapshot>,
    /// Denormalized name, office and location
    pub identity: Option<TargetIdentity>,
}

/// Options shared by every entry of one bulk operation.
#[derive(Debug, Clone, Default)]
pub struct BulkOptions {
    /// Where the batch came from
    pub source: LogSource,
    /// Justification copied to every entry
    pub reason: Option<String>,
}

/// Entries written by one bulk call.
#[derive(Debug, Clone)]
pub struct BulkLogResult {
    /// Id shared by the entries
    pub batch_id: String,
    /// Entries in input order
    pub entries: Vec<activity_log::Model>,
}

/// Generates a fresh batch identifier.
#[must_use]
pub fn new_batch_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Writes one audit entry.
#[instrument(skip(db, config), fields(action = %config.action, target = %config.target_type))]
pub async fn log<C>(db: &C, actor_id: i64, config: LogConfig) -> Result<activity_log::Model>
where
    C: ConnectionTrait,
{
    let actor = resolve_actor(db, actor_id).await?;
    insert_entry(db, &actor, config).await
}

/// Writes one entry per record, all sharing a newly generated batch id.
///
/// Records are written in the order given so the batch reads back in that order.
#[instrument(skip(db, records, options), fields(action = %action, records = records.len()))]
pub async fn log_bulk<C>(
    db: &C,
    actor_id: i64,
    action: ActivityAction,
    records: Vec<BulkLogRecord>,
    options: BulkOptions,
) -> Result<BulkLogResult>
where
    C: ConnectionTrait,
{
    let actor = resolve_actor(db, actor_id).await?;
    let batch_id = new_batch_id();
    let mut entries = Vec::with_capacity(records.len());

    for record in records {
        let mut config = LogConfig::new(action, record.target_type);
        config.target_id = record.target_id;
        config.identity = record.identity;
        config.reason.clone_from(&options.reason);
        config.source = options.source;
        config.batch_id = Some(batch_id.clone());
        match (record.previous, record.new) {
            (Some(previous), Some(new)) => config.change = Some((previous, new)),
            (previous, new) => config.snapshot = new.or(previous),
        }

        entries.push(insert_entry(db, &actor, config).await?);
    }

    debug!("Wrote {} entries for batch {}", entries.len(), batch_id);
    Ok(BulkLogResult { batch_id, entries })
}

async fn insert_entry<C>(
    db: &C,
    actor: &ActorSnapshot,
    config: LogConfig,
) -> Result<activity_log::Model>
where
    C: ConnectionTrait,
{
    let (previous, new) = match (config.change, config.snapshot) {
        (Some((previous, new)), _) => (Some(previous), Some(new)),
        (None, Some(snapshot)) if config.action.snapshot_is_previous() => (Some(snapshot), None),
        (None, snapshot) => (None, snapshot),
    };

    let (changed_fields, change_summary) = match (&previous, &new) {
        (Some(p), Some(n)) => {
            let changes = diff::diff(Some(&p.fields()?), Some(&n.fields()?));
            (
                Some(serde_json::to_string(&changes.changed_fields)?),
                Some(serde_json::to_string(&changes.summary)?),
            )
        }
        _ => (None, None),
    };

    let identity = config
        .identity
        .or_else(|| new.as_ref().or(previous.as_ref()).map(RecordSnapshot::identity))
        .unwrap_or_default();

    let entry = activity_log::ActiveModel {
        action: Set(config.action.as_str().to_string()),
        target_type: Set(config.target_type.as_str().to_string()),
        target_id: Set(config.target_id),
        target_name: Set(identity.name),
        implementing_office: Set(identity.office),
        location: Set(identity.location),
        previous_values: Set(previous.as_ref().map(RecordSnapshot::encode).transpose()?),
        new_values: Set(new.as_ref().map(RecordSnapshot::encode).transpose()?),
        changed_fields: Set(changed_fields),
        change_summary: Set(change_summary),
        actor_id: Set(actor.id),
        actor_name: Set(actor.name.clone()),
        actor_email: Set(actor.email.clone()),
        actor_role: Set(actor.role.clone()),
        reason: Set(config.reason),
        source: Set(config.source.as_str().to_string()),
        batch_id: Set(config.batch_id),
        timestamp: Set(Utc::now()),
        is_reviewed: Set(false),
        reviewed_by: Set(None),
        reviewed_at: Set(None),
        ..Default::default()
    };

    entry.insert(db).await.map_err(Into::into)
}

/// Annotates an entry as reviewed. Touches only the review columns.
pub async fn mark_reviewed<C>(db: &C, log_id: i64, reviewer_id: i64) -> Result<activity_log::Model>
where
    C: ConnectionTrait,
{
    let reviewer = resolve_actor(db, reviewer_id).await?;
    let entry = ActivityLog::find_by_id(log_id)
        .one(db)
        .await?
        .ok_or(Error::LogNotFound { id: log_id })?;

    let mut active: activity_log::ActiveModel = entry.into();
    active.is_reviewed = Set(true);
    active.reviewed_by = Set(Some(reviewer.id));
    active.reviewed_at = Set(Some(Utc::now()));
    active.update(db).await.map_err(Into::into)
}

/// History of one record, oldest first.
pub async fn logs_for_target<C>(
    db: &C,
    target_type: TargetType,
    target_id: i64,
) -> Result<Vec<activity_log::Model>>
where
    C: ConnectionTrait,
{
    ActivityLog::find()
        .filter(activity_log::Column::TargetType.eq(target_type.as_str()))
        .filter(activity_log::Column::TargetId.eq(target_id))
        .order_by_asc(activity_log::Column::Timestamp)
        .order_by_asc(activity_log::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Everything one user did, oldest first.
pub async fn logs_for_actor<C>(db: &C, actor_id: i64) -> Result<Vec<activity_log::Model>>
where
    C: ConnectionTrait,
{
    ActivityLog::find()
        .filter(activity_log::Column::ActorId.eq(actor_id))
        .order_by_asc(activity_log::Column::Timestamp)
        .order_by_asc(activity_log::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Entries of one bulk operation, in write order.
pub async fn logs_for_batch<C>(db: &C, batch_id: &str) -> Result<Vec<activity_log::Model>>
where
    C: ConnectionTrait,
{
    ActivityLog::find()
        .filter(activity_log::Column::BatchId.eq(batch_id))
        .order_by_asc(activity_log::Column::Timestamp)
        .order_by_asc(activity_log::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Most recent entries, newest first.
pub async fn recent_logs<C>(db: &C, limit: u64) -> Result<Vec<activity_log::Model>>
where
    C: ConnectionTrait,
{
    ActivityLog::find()
        .order_by_desc(activity_log::Column::Timestamp)
        .order_by_desc(activity_log::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Decoded view helpers over a stored entry.
pub trait ActivityEntryExt {
    /// Snapshot before the action, if one was stored.
    fn previous_snapshot(&self) -> Result<Option<RecordSnapshot>>;
    /// Snapshot after the action, if one was stored.
    fn new_snapshot(&self) -> Result<Option<RecordSnapshot>>;
    /// Changed field names, empty when none were recorded.
    fn changed_field_names(&self) -> Result<Vec<String>>;
    /// Tracked-field summary, if one was recorded.
    fn summary(&self) -> Result<Option<ChangeSummary>>;
}

impl ActivityEntryExt for activity_log::Model {
    fn previous_snapshot(&self) -> Result<Option<RecordSnapshot>> {
        self.previous_values.as_deref().map(RecordSnapshot::decode).transpose()
    }

    fn new_snapshot(&self) -> Result<Option<RecordSnapshot>> {
        self.new_values.as_deref().map(RecordSnapshot::decode).transpose()
    }

    fn changed_field_names(&self) -> Result<Vec<String>> {
        match self.changed_fields.as_deref() {
            Some(raw) => serde_json::from_str(raw).map_err(Into::into),
            None => Ok(Vec::new()),
        }
    }

    fn summary(&self) -> Result<Option<ChangeSummary>> {
        self.change_summary
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::{core::actor::set_user_role, test_utils::*};

    #[tokio::test]
    async fn test_update_entry_carries_diff() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Auditor").await?;
        let item = create_test_budget_item(&db, user.id, "Health Fund", 100.0).await?;

        let mut changed = item.clone();
        changed.total_budget_allocated = 150.0;

        let entry = log(
            &db,
            user.id,
            LogConfig::with_change(
                ActivityAction::Updated,
                RecordSnapshot::BudgetItem(item.clone()),
                RecordSnapshot::BudgetItem(changed),
            )
            .reason(Some("Supplemental budget".to_string())),
        )
        .await?;

        assert_eq!(entry.action, "updated");
        assert_eq!(entry.target_type, "budget_item");
        assert_eq!(entry.target_id, Some(item.id));
        assert_eq!(entry.target_name.as_deref(), Some("Health Fund"));
        assert_eq!(entry.changed_field_names()?, vec!["total_budget_allocated"]);
        let summary = entry.summary()?.unwrap();
        assert!(summary.budget_changed);
        assert_eq!(summary.old_budget, Some(100.0));
        assert_eq!(summary.new_budget, Some(150.0));
        assert_eq!(entry.reason.as_deref(), Some("Supplemental budget"));
        assert_eq!(entry.source, "web_ui");

        Ok(())
    }

    #[tokio::test]
    async fn test_delete_entry_stores_previous_snapshot() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Auditor").await?;
        let item = create_test_budget_item(&db, user.id, "Old Fund", 10.0).await?;

        let entry = log(
            &db,
            user.id,
            LogConfig::with_snapshot(ActivityAction::Deleted, RecordSnapshot::BudgetItem(item.clone())),
        )
        .await?;

        assert!(entry.new_values.is_none());
        assert_eq!(entry.previous_snapshot()?, Some(RecordSnapshot::BudgetItem(item)));
        assert!(entry.changed_fields.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_actor_fails_logging() -> Result<()> {
        let db = setup_test_db().await?;
        let result = log(
            &db,
            99,
            LogConfig::new(ActivityAction::Viewed, TargetType::Project),
        )
        .await;
        assert!(matches!(result, Err(Error::ActorNotFound { id: 99 })));
        assert!(recent_logs(&db, 10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_actor_is_snapshotted_at_write_time() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Clerk").await?;

        let entry = log(&db, user.id, LogConfig::new(ActivityAction::Exported, TargetType::Project)).await?;
        set_user_role(&db, user.id, "admin").await?;

        let history = logs_for_actor(&db, user.id).await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, entry.id);
        assert_eq!(history[0].actor_role, "staff");
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_writes_one_entry_per_record() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Importer").await?;
        let a = create_test_budget_item(&db, user.id, "A", 1.0).await?;
        let b = create_test_budget_item(&db, user.id, "B", 2.0).await?;

        let records = [a, b]
            .into_iter()
            .map(|item| BulkLogRecord {
                target_type: TargetType::BudgetItem,
                target_id: Some(item.id),
                previous: None,
                new: Some(RecordSnapshot::BudgetItem(item)),
                identity: None,
            })
            .collect();

        let result = log_bulk(
            &db,
            user.id,
            ActivityAction::BulkCreated,
            records,
            BulkOptions {
                source: LogSource::BulkImport,
                reason: Some("Initial import".to_string()),
            },
        )
        .await?;

        assert_eq!(result.entries.len(), 2);
        let batch = logs_for_batch(&db, &result.batch_id).await?;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].target_name.as_deref(), Some("A"));
        assert_eq!(batch[1].target_name.as_deref(), Some("B"));
        assert!(batch.iter().all(|e| e.source == "bulk_import" && e.action == "bulk_created"));
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_reviewed_only_touches_review_fields() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "Clerk").await?;
        let reviewer = create_test_user(&db, "Supervisor").await?;
        let entry = log(&db, user.id, LogConfig::new(ActivityAction::Viewed, TargetType::Project)).await?;

        let reviewed = mark_reviewed(&db, entry.id, reviewer.id).await?;
        assert!(reviewed.is_reviewed);
        assert_eq!(reviewed.reviewed_by, Some(reviewer.id));
        assert_eq!(reviewed.action, entry.action);
        assert_eq!(reviewed.timestamp, entry.timestamp);
        assert_eq!(reviewed.actor_id, entry.actor_id);

        let missing = mark_reviewed(&db, 999, reviewer.id).await;
        assert!(matches!(missing, Err(Error::LogNotFound { id: 999 })));
        Ok(())
    }
}
