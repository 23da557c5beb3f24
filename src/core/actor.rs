//! Actor resolution - who is performing an action.
//!
//! Every mutation receives the acting user's id explicitly. The audit logger
//! resolves it here to a snapshot of name, email and role taken at action time.

use crate::{
    entities::{User, user},
    errors::{Error, Result},
};
use sea_orm::{Set, prelude::*};

/// Identity of the acting user, captured when an action is logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorSnapshot {
    /// User id
    pub id: i64,
    /// Display name at action time
    pub name: String,
    /// Email at action time
    pub email: String,
    /// Role at action time
    pub role: String,
}

impl From<user::Model> for ActorSnapshot {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }
}

/// Looks up the acting user, failing with `ActorNotFound` if the record is absent.
pub async fn resolve_actor<C>(db: &C, actor_id: i64) -> Result<ActorSnapshot>
where
    C: ConnectionTrait,
{
    User::find_by_id(actor_id)
        .one(db)
        .await?
        .map(ActorSnapshot::from)
        .ok_or(Error::ActorNotFound { id: actor_id })
}

/// Registers a user record.
pub async fn create_user(
    db: &DatabaseConnection,
    name: &str,
    email: &str,
    role: &str,
) -> Result<user::Model> {
    if name.trim().is_empty() {
        return Err(Error::Validation {
            message: "User name cannot be empty".to_string(),
        });
    }

    let user = user::ActiveModel {
        name: Set(name.trim().to_string()),
        email: Set(email.trim().to_string()),
        role: Set(role.to_string()),
        ..Default::default()
    };

    user.insert(db).await.map_err(Into::into)
}

/// Changes a user's role. Past audit entries keep the role they were written with.
pub async fn set_user_role(db: &DatabaseConnection, user_id: i64, role: &str) -> Result<user::Model> {
    let user = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(Error::ActorNotFound { id: user_id })?;

    let mut active: user::ActiveModel = user.into();
    active.role = Set(role.to_string());
    active.update(db).await.map_err(Into::into)
}
