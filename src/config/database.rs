//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. The secondary indexes created here back
//! the lookups the aggregators run on every recompute (children by parent, filtered by
//! the soft-delete flag) and the audit-log lookups by target, actor and batch.

use crate::entities::{
    ActivityLog, ActivityLogColumn, BreakdownColumn, BudgetItem, Project, ProjectBreakdown,
    ProjectColumn, User,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/budget_rollup.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a default local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    debug!("Connecting to {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

/// Creates all tables and indexes if they do not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    // Parents before children so the foreign keys resolve
    let tables = [
        schema.create_table_from_entity(User).if_not_exists().to_owned(),
        schema
            .create_table_from_entity(BudgetItem)
            .if_not_exists()
            .to_owned(),
        schema.create_table_from_entity(Project).if_not_exists().to_owned(),
        schema
            .create_table_from_entity(ProjectBreakdown)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(ActivityLog)
            .if_not_exists()
            .to_owned(),
    ];

    for table in &tables {
        db.execute(builder.build(table)).await?;
    }

    for index in index_statements() {
        db.execute(builder.build(&index)).await?;
    }

    info!("Database tables and indexes ensured");
    Ok(())
}

fn index_statements() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .if_not_exists()
            .name("idx_projects_budget_item_active")
            .table(Project)
            .col(ProjectColumn::BudgetItemId)
            .col(ProjectColumn::IsDeleted)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_breakdowns_project_active")
            .table(ProjectBreakdown)
            .col(BreakdownColumn::ProjectId)
            .col(BreakdownColumn::IsDeleted)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_breakdowns_project_report_date")
            .table(ProjectBreakdown)
            .col(BreakdownColumn::ProjectId)
            .col(BreakdownColumn::ReportDate)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_activity_logs_target")
            .table(ActivityLog)
            .col(ActivityLogColumn::TargetType)
            .col(ActivityLogColumn::TargetId)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_activity_logs_actor")
            .table(ActivityLog)
            .col(ActivityLogColumn::ActorId)
            .col(ActivityLogColumn::Timestamp)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("idx_activity_logs_batch")
            .table(ActivityLog)
            .col(ActivityLogColumn::BatchId)
            .to_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ActivityLogModel, BreakdownModel, BudgetItemModel, ProjectModel};
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<BudgetItemModel> = BudgetItem::find().limit(1).all(&db).await?;
        let _: Vec<ProjectModel> = Project::find().limit(1).all(&db).await?;
        let _: Vec<BreakdownModel> = ProjectBreakdown::find().limit(1).all(&db).await?;
        let _: Vec<ActivityLogModel> = ActivityLog::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_rerunnable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
