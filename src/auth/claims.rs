use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Full access to every endpoint
pub const ROLE_ADMIN: &str = "admin";
/// May submit deliveries and query their status
pub const ROLE_DELIVERY_SUBMIT: &str = "delivery:submit";
/// May inspect and re-drive dead letters
pub const ROLE_DELIVERY_ADMIN: &str = "delivery:admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (calling service or operator)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Granted roles
    #[serde(default)]
    pub roles: Vec<String>,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    pub fn subject(&self) -> &str {
        &self.sub
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// True if the caller holds any of `roles`; `admin` always qualifies
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        self.has_role(ROLE_ADMIN) || roles.iter().any(|role| self.has_role(role))
    }

    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp < now
    }
}
