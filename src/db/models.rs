use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Coarse identity partition. Enforced both at token issuance (login body
/// must match the stored role) and at route level (allowed-role lists).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Traveler,
    Owner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Traveler => write!(f, "traveler"),
            Role::Owner => write!(f, "owner"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "traveler" => Ok(Role::Traveler),
            "owner" => Ok(Role::Owner),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// One identity record. `session_pointer` holds the currently-authorized
/// refresh token; at most one live session per account. A new login
/// overwrites the pointer, silently invalidating any prior refresh token
/// even if it has not yet expired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub session_pointer: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: String, email: String, password_hash: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash,
            role,
            session_pointer: None,
            created_at: Utc::now(),
        }
    }

    /// Wire representation. Never exposes the password hash or the
    /// session pointer.
    pub fn public(&self) -> PublicAccount {
        PublicAccount {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicAccount {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}
