use serde::{Deserialize, Serialize};

/// Account record as exposed to handlers. The password hash never
/// leaves the query layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_lawyer(&self) -> bool {
        self.role == Role::Lawyer
    }
}

/// Minimal projection of a user for embedding in other payloads.
#[derive(Debug, Clone, Serialize)]
pub struct Party {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Lawyer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Lawyer => "lawyer",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "lawyer" => Role::Lawyer,
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }

    /// Roles accepted at self-registration. Admin accounts are only
    /// ever seeded from configuration.
    pub fn registerable(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "lawyer" => Some(Role::Lawyer),
            _ => None,
        }
    }
}
