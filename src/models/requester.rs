use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Doctor,
    Admin,
}

impl Role {
    /// Only members are metered by tier quotas.
    pub fn is_metered(&self) -> bool {
        matches!(self, Role::Member)
    }
}

/// Who is calling, as resolved by the host's authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterContext {
    pub user_id: String,
    pub role: Role,
}

impl RequesterContext {
    pub fn member(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::Member,
        }
    }

    pub fn with_role(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}
