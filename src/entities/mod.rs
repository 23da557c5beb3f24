//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod activity_log;
pub mod budget_item;
pub mod project;
pub mod project_breakdown;
pub mod user;

// Re-export specific types to avoid conflicts
pub use activity_log::{
    Column as ActivityLogColumn, Entity as ActivityLog, Model as ActivityLogModel,
};
pub use budget_item::{Column as BudgetItemColumn, Entity as BudgetItem, Model as BudgetItemModel};
pub use project::{Column as ProjectColumn, Entity as Project, Model as ProjectModel};
pub use project_breakdown::{
    Column as BreakdownColumn, Entity as ProjectBreakdown, Model as BreakdownModel,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
