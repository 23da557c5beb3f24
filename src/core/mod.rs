/// Audit trail: log entries, diffs of snapshots, review and queries
pub mod activity;

/// Acting user resolution
pub mod actor;

/// Breakdown mutations, single and bulk
pub mod breakdown;

/// Budget item CRUD and rollup from projects
pub mod budget_item;

/// Field-level diff of record snapshots
pub mod diff;

/// Project CRUD, hard delete and rollup from breakdowns
pub mod project;

/// Status vocabulary and the rollup arithmetic
pub mod rollup;

/// Versioned record snapshots stored in the audit log
pub mod snapshot;

/// Project trash with cascade to breakdowns
pub mod trash;
