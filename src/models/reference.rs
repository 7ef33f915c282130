use crate::models::child::Gender;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Percentile-for-age (and weight-for-length) reference tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthMetric {
    Bmi,
    HeightForAge,
    WeightForAge,
    HeadCircumferenceForAge,
    ArmCircumferenceForAge,
    WeightForLength,
}

impl GrowthMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthMetric::Bmi => "bmi",
            GrowthMetric::HeightForAge => "height_for_age",
            GrowthMetric::WeightForAge => "weight_for_age",
            GrowthMetric::HeadCircumferenceForAge => "head_circumference_for_age",
            GrowthMetric::ArmCircumferenceForAge => "arm_circumference_for_age",
            GrowthMetric::WeightForLength => "weight_for_length",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "bmi" => Some(GrowthMetric::Bmi),
            "height_for_age" => Some(GrowthMetric::HeightForAge),
            "weight_for_age" => Some(GrowthMetric::WeightForAge),
            "head_circumference_for_age" => Some(GrowthMetric::HeadCircumferenceForAge),
            "arm_circumference_for_age" => Some(GrowthMetric::ArmCircumferenceForAge),
            "weight_for_length" => Some(GrowthMetric::WeightForLength),
            _ => None,
        }
    }
}

impl fmt::Display for GrowthMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics that have velocity reference tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityMetric {
    Height,
    Weight,
    HeadCircumference,
}

impl VelocityMetric {
    pub const ALL: [VelocityMetric; 3] = [
        VelocityMetric::Height,
        VelocityMetric::Weight,
        VelocityMetric::HeadCircumference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VelocityMetric::Height => "height",
            VelocityMetric::Weight => "weight",
            VelocityMetric::HeadCircumference => "head_circumference",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "height" => Some(VelocityMetric::Height),
            "weight" => Some(VelocityMetric::Weight),
            "head_circumference" => Some(VelocityMetric::HeadCircumference),
            _ => None,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            VelocityMetric::Weight => "kg",
            VelocityMetric::Height | VelocityMetric::HeadCircumference => "cm",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VelocityMetric::Height => "height",
            VelocityMetric::Weight => "weight",
            VelocityMetric::HeadCircumference => "head circumference",
        }
    }
}

/// Resolution of the age key passed to the reference store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeUnit {
    Days,
    Months,
}

impl fmt::Display for AgeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgeUnit::Days => f.write_str("days"),
            AgeUnit::Months => f.write_str("months"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub percentile: f64,
    pub value: f64,
}

impl ReferencePoint {
    pub fn new(percentile: f64, value: f64) -> Self {
        Self { percentile, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRow {
    pub metric: GrowthMetric,
    pub gender: Gender,
    pub age_in_days: Option<u32>,
    pub age_in_months: Option<u32>,
    /// Only set for weight-for-length rows.
    pub height: Option<f64>,
    pub l: f64,
    pub m: f64,
    pub s: f64,
    pub values: Vec<ReferencePoint>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntervalBoundary {
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
}

impl IntervalBoundary {
    pub fn weeks(weeks: u32) -> Self {
        Self { months: 0, weeks, days: 0 }
    }

    pub fn months(months: u32) -> Self {
        Self { months, weeks: 0, days: 0 }
    }

    /// Days from birth for this boundary given the month conversion rate.
    pub fn to_days(&self, month_to_day_rate: f64) -> f64 {
        self.months as f64 * month_to_day_rate + self.weeks as f64 * 7.0 + self.days as f64
    }

    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if self.months > 0 {
            parts.push(plural(self.months, "month"));
        }
        if self.weeks > 0 {
            parts.push(plural(self.weeks, "week"));
        }
        if self.days > 0 {
            parts.push(plural(self.days, "day"));
        }
        if parts.is_empty() {
            return "birth".to_string();
        }
        parts.join(" ")
    }
}

fn plural(count: u32, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceVelocityRow {
    pub metric: VelocityMetric,
    pub gender: Gender,
    pub first_interval: IntervalBoundary,
    pub last_interval: IntervalBoundary,
    pub l: f64,
    pub m: f64,
    pub s: f64,
    pub delta: f64,
    pub values: Vec<ReferencePoint>,
}

/// Offline bulk-load payload for both reference tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceBundle {
    #[serde(default)]
    pub rows: Vec<ReferenceRow>,
    #[serde(default)]
    pub velocity_rows: Vec<ReferenceVelocityRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub row_count: usize,
    pub velocity_row_count: usize,
}
