use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLimit {
    pub value: u32,
    pub time_days: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub tier_level: u8,
    pub children_limit: u32,
    pub update_limit: ActionLimit,
    pub view_limit: ActionLimit,
}

impl Tier {
    pub fn limit_for(&self, action: QuotaAction) -> &ActionLimit {
        match action {
            QuotaAction::Update => &self.update_limit,
            QuotaAction::View => &self.view_limit,
        }
    }

    pub fn is_free(&self) -> bool {
        self.tier_level == 0
    }
}

/// The package a paid subscription was bought under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub tier_level: u8,
    pub duration_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: String,
    pub tier_level: u8,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub current_plan_id: Option<String>,
    /// When the account's subscription record was created; anchors free-tier windows.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn free(user_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            tier_level: 0,
            start_date: None,
            end_date: None,
            current_plan_id: None,
            created_at,
        }
    }

    /// Quota windows are anchored here.
    pub fn anchor(&self) -> DateTime<Utc> {
        self.start_date.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuotaAction {
    Update,
    View,
}

impl QuotaAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaAction::Update => "UPDATE",
            QuotaAction::View => "VIEW",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "UPDATE" => Some(QuotaAction::Update),
            "VIEW" => Some(QuotaAction::View),
            _ => None,
        }
    }
}

impl fmt::Display for QuotaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
