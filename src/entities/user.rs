//! User entity - The identity records that actors are resolved from.
//!
//! Authentication lives outside this crate; the table is only read to take a
//! snapshot of the actor's name, email and role at the moment of an action.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Role label (e.g., "admin", "staff")
    pub role: String,
}

/// Users are referenced by id only; no relations are declared
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
