//! Shared test utilities for `budget-rollup`.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{actor, breakdown, budget_item, project},
    entities,
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::DatabaseConnection;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a test user.
///
/// # Defaults
/// * `email`: derived from the name, e.g. `maria.santos@example.gov`
/// * `role`: "staff"
pub async fn create_test_user(db: &DatabaseConnection, name: &str) -> Result<entities::user::Model> {
    let email = format!("{}@example.gov", name.to_lowercase().replace(' ', "."));
    actor::create_user(db, name, &email, "staff").await
}

/// Creates a test budget item with no description.
pub async fn create_test_budget_item(
    db: &DatabaseConnection,
    actor_id: i64,
    name: &str,
    allocation: f64,
) -> Result<entities::budget_item::Model> {
    budget_item::create_budget_item(db, actor_id, name, allocation, None, None).await
}

/// Creates a test project with sensible defaults.
///
/// # Defaults
/// * `budget_item_id`: None
/// * `implementing_office`: "Engineering Office"
/// * `total_budget_allocated`: 100.0, nothing obligated or utilized
pub async fn create_test_project(
    db: &DatabaseConnection,
    actor_id: i64,
    name: &str,
) -> Result<entities::project::Model> {
    create_custom_project(db, actor_id, None, name, 100.0, 0.0, 0.0).await
}

/// Creates a test project with custom financials.
/// Use this when you need to test rollup arithmetic.
pub async fn create_custom_project(
    db: &DatabaseConnection,
    actor_id: i64,
    budget_item_id: Option<i64>,
    name: &str,
    allocated: f64,
    obligated: f64,
    utilized: f64,
) -> Result<entities::project::Model> {
    project::create_project(
        db,
        actor_id,
        project::NewProject {
            budget_item_id,
            name: name.to_string(),
            implementing_office: "Engineering Office".to_string(),
            total_budget_allocated: allocated,
            obligated_budget: obligated,
            total_budget_utilized: utilized,
            ..Default::default()
        },
        None,
    )
    .await
}

/// Breakdown report fields with sensible defaults.
///
/// # Defaults
/// * `report_date`: 2024-03-31
/// * location: Poblacion, San Jose, District I
/// * `appropriation`: 50.0, `obligation`: 20.0, `balance`: 30.0
/// * `accomplishment_rate`: 25.0
/// * `status`: "ongoing"
#[must_use]
pub fn test_fields() -> breakdown::BreakdownFields {
    breakdown::BreakdownFields {
        report_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap_or_default(),
        district: Some("District I".to_string()),
        municipality: Some("San Jose".to_string()),
        barangay: Some("Poblacion".to_string()),
        appropriation: 50.0,
        obligation: 20.0,
        balance: 30.0,
        accomplishment_rate: 25.0,
        status: Some("ongoing".to_string()),
        remarks: None,
    }
}

/// Creates a test breakdown under `project_id` with the given status.
pub async fn create_test_breakdown(
    db: &DatabaseConnection,
    actor_id: i64,
    project_id: i64,
    status: Option<&str>,
) -> Result<entities::project_breakdown::Model> {
    breakdown::create_breakdown(
        db,
        actor_id,
        breakdown::NewBreakdown {
            project_id,
            fields: breakdown::BreakdownFields {
                status: status.map(str::to_string),
                ..test_fields()
            },
        },
        None,
    )
    .await
}
