#![allow(clippy::result_large_err)]

use budget_rollup::{
    config::{database, settings},
    core::{actor, budget_item, project},
    errors::Result,
};
use dotenvy::dotenv;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, env vars can also be set externally
    dotenv().ok();

    // 3. Load config.toml
    let app_settings = settings::load_default_settings()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;

    // 4. Connect and make sure the schema exists
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db)
        .await
        .inspect(|_| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to create tables: {}", e))?;

    let Some(actor_id) = app_settings.system.actor_id else {
        warn!("No [system] actor_id configured; skipping seeding and reconciliation");
        return Ok(());
    };
    let system_actor = actor::resolve_actor(&db, actor_id)
        .await
        .inspect_err(|e| error!("System actor is not a known user: {}", e))?;
    info!("Running as {} ({})", system_actor.name, system_actor.role);

    // 5. Seed configured budget items that don't exist yet
    for seed in app_settings.budget_items {
        if budget_item::get_budget_item_by_name(&db, &seed.name).await?.is_some() {
            debug!("Budget item '{}' already exists, skipping seed", seed.name);
            continue;
        }
        budget_item::create_budget_item(
            &db,
            actor_id,
            &seed.name,
            seed.allocation,
            seed.description,
            Some("Seeded from config.toml".to_string()),
        )
        .await
        .inspect(|item| info!("Seeded budget item {} ({})", item.id, item.name))?;
    }

    // 6. Reconcile derived fields that may have drifted
    let report = project::recompute_all(&db, actor_id).await?;
    for failure in &report.failures {
        error!(
            "Reconciliation failed for {} {}: {}",
            failure.target_type, failure.id, failure.error
        );
    }
    info!(
        "Reconciliation finished: {} project(s) recomputed, {} failure(s)",
        report.recomputed.len(),
        report.failures.len()
    );

    Ok(())
}
