use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// "son" / "daughter", used in growth descriptions.
    pub fn child_noun(&self) -> &'static str {
        match self {
            Gender::Male => "son",
            Gender::Female => "daughter",
        }
    }

    /// "boys" / "girls", used when describing the peer population.
    pub fn peer_noun(&self) -> &'static str {
        match self {
            Gender::Male => "boys",
            Gender::Female => "girls",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            other => Err(format!("unknown gender '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Child {
    pub id: String,
    pub birth_date: DateTime<Utc>,
    pub gender: Gender,
}

/// Unvalidated child registration payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildRequest {
    pub id: String,
    pub birth_date: String,
    pub gender: String,
}
