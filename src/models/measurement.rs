use crate::models::growth_result::GrowthResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored snapshot of a child's measurements. Height and lengths in cm, weight in kg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: String,
    pub child_id: String,
    pub taken_at: DateTime<Utc>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub head_circumference: Option<f64>,
    pub arm_circumference: Option<f64>,
    pub growth_result: Option<GrowthResult>,
}

impl Measurement {
    pub fn input(&self) -> MeasurementInput {
        MeasurementInput {
            taken_at: self.taken_at,
            height: self.height,
            weight: self.weight,
            head_circumference: self.head_circumference,
            arm_circumference: self.arm_circumference,
        }
    }
}

/// Validated measurement values ready for assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementInput {
    pub taken_at: DateTime<Utc>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub head_circumference: Option<f64>,
    pub arm_circumference: Option<f64>,
}

impl MeasurementInput {
    pub fn is_empty(&self) -> bool {
        self.height.is_none()
            && self.weight.is_none()
            && self.head_circumference.is_none()
            && self.arm_circumference.is_none()
    }

    /// Fields present on `self` win over `base`.
    pub fn merged_over(&self, base: &MeasurementInput) -> MeasurementInput {
        MeasurementInput {
            taken_at: self.taken_at,
            height: self.height.or(base.height),
            weight: self.weight.or(base.weight),
            head_circumference: self.head_circumference.or(base.head_circumference),
            arm_circumference: self.arm_circumference.or(base.arm_circumference),
        }
    }
}

/// Raw measurement payload as received from the caller. `taken_at` is ISO-8601 and
/// required on create; on update an absent `taken_at` keeps the stored instant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeasurementRequest {
    pub taken_at: Option<String>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub head_circumference: Option<f64>,
    pub arm_circumference: Option<f64>,
}
