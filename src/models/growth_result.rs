use serde::{Deserialize, Serialize};

/// Sentinel percentile for a metric that was not computed.
pub const PERCENTILE_NOT_COMPUTED: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrowthLevel {
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "Below Average")]
    BelowAverage,
    #[serde(rename = "Average")]
    Average,
    #[serde(rename = "Above Average")]
    AboveAverage,
    #[serde(rename = "High")]
    High,
    #[serde(rename = "Underweight")]
    Underweight,
    #[serde(rename = "Healthy")]
    Healthy,
    #[serde(rename = "Overweight")]
    Overweight,
    #[serde(rename = "Obese")]
    Obese,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl GrowthLevel {
    pub fn label(&self) -> &'static str {
        match self {
            GrowthLevel::Low => "Low",
            GrowthLevel::BelowAverage => "Below Average",
            GrowthLevel::Average => "Average",
            GrowthLevel::AboveAverage => "Above Average",
            GrowthLevel::High => "High",
            GrowthLevel::Underweight => "Underweight",
            GrowthLevel::Healthy => "Healthy",
            GrowthLevel::Overweight => "Overweight",
            GrowthLevel::Obese => "Obese",
            GrowthLevel::NotAvailable => "N/A",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAssessment {
    pub percentile: f64,
    pub description: String,
    pub level: GrowthLevel,
}

impl MetricAssessment {
    pub fn not_available() -> Self {
        Self {
            percentile: PERCENTILE_NOT_COMPUTED,
            description: "Not enough data to calculate.".to_string(),
            level: GrowthLevel::NotAvailable,
        }
    }

    pub fn is_computed(&self) -> bool {
        self.percentile >= 0.0
    }
}

impl Default for MetricAssessment {
    fn default() -> Self {
        Self::not_available()
    }
}

/// Per-metric assessment attached to a measurement snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowthResult {
    pub height: MetricAssessment,
    pub weight: MetricAssessment,
    pub bmi: MetricAssessment,
    pub head_circumference: MetricAssessment,
    pub arm_circumference: MetricAssessment,
    pub weight_for_length: MetricAssessment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_result_is_not_computed() {
        let result = GrowthResult::default();
        assert_eq!(result.bmi.percentile, PERCENTILE_NOT_COMPUTED);
        assert_eq!(result.height.level, GrowthLevel::NotAvailable);
        assert!(!result.weight_for_length.is_computed());
    }

    #[test]
    fn levels_serialize_with_display_labels() {
        let json = serde_json::to_string(&GrowthLevel::BelowAverage).expect("serialize level");
        assert_eq!(json, "\"Below Average\"");
        let na = serde_json::to_string(&GrowthLevel::NotAvailable).expect("serialize level");
        assert_eq!(na, "\"N/A\"");
    }
}
