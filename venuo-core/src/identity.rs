use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of the party performing an operation. Every mutating operation
/// takes an explicit [`Principal`]; there is no ambient "current user".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Customer,
    Vendor,
    Admin,
    System,
}

/// Authenticated principal handed down by the identity provider.
/// The engine trusts this identity for all actor checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Principal {
    pub fn customer(id: Uuid) -> Self {
        Self { id, role: ActorRole::Customer }
    }

    pub fn vendor(id: Uuid) -> Self {
        Self { id, role: ActorRole::Vendor }
    }

    pub fn admin(id: Uuid) -> Self {
        Self { id, role: ActorRole::Admin }
    }

    pub fn system() -> Self {
        Self { id: Uuid::nil(), role: ActorRole::System }
    }
}
