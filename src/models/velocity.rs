use crate::models::growth_result::PERCENTILE_NOT_COMPUTED;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const INSUFFICIENT_DATA: &str = "Insufficient data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityAssessment {
    pub percentile: f64,
    /// Change per month; `None` when it could not be computed.
    pub velocity: Option<f64>,
    pub description: String,
}

impl VelocityAssessment {
    pub fn insufficient() -> Self {
        Self {
            percentile: PERCENTILE_NOT_COMPUTED,
            velocity: None,
            description: INSUFFICIENT_DATA.to_string(),
        }
    }
}

/// One canonical age window of the growth velocity report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthVelocityResult {
    pub period: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub height: VelocityAssessment,
    pub weight: VelocityAssessment,
    pub head_circumference: VelocityAssessment,
}
