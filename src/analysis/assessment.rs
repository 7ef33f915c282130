use crate::analysis::age::{age_in_days, age_key};
use crate::analysis::classification::{describe_bmi, describe_generic};
use crate::analysis::interpolation::interpolate_percentile;
use crate::error::GrowthError;
use crate::models::child::Child;
use crate::models::growth_result::{GrowthResult, MetricAssessment};
use crate::models::measurement::MeasurementInput;
use crate::models::reference::{AgeUnit, GrowthMetric, ReferenceRow};
use crate::store::ReferenceTableAccess;

pub const DEFAULT_MONTH_TO_DAY_RATE: f64 = 30.4375;
pub const DEFAULT_DAILY_TABLE_MAX_AGE_DAYS: u32 = 1856;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssessmentParams {
    pub month_to_day_rate: f64,
    pub daily_table_max_age_days: u32,
}

impl Default for AssessmentParams {
    fn default() -> Self {
        Self {
            month_to_day_rate: DEFAULT_MONTH_TO_DAY_RATE,
            daily_table_max_age_days: DEFAULT_DAILY_TABLE_MAX_AGE_DAYS,
        }
    }
}

/// BMI from height in cm and weight in kg.
pub fn bmi(height_cm: f64, weight_kg: f64) -> Option<f64> {
    if height_cm <= 0.0 || !height_cm.is_finite() || !weight_kg.is_finite() {
        return None;
    }
    Some(weight_kg / (height_cm * height_cm) * 10_000.0)
}

/// Place one snapshot within the reference distributions for the child's age and gender.
///
/// Metrics without input stay at `MetricAssessment::not_available()`. A missing
/// reference row for a metric that has input is `MissingReference`, keyed by age
/// or, for weight-for-length, by height.
pub fn assess_growth<R>(
    refs: &R,
    child: &Child,
    input: &MeasurementInput,
    params: &AssessmentParams,
) -> Result<GrowthResult, GrowthError>
where
    R: ReferenceTableAccess + ?Sized,
{
    let age_days = age_in_days(child.birth_date, input.taken_at);
    if age_days < 0 {
        return Err(GrowthError::invalid(
            "taken_at",
            "measurement predates the child's birth date",
        ));
    }

    let mut result = GrowthResult::default();
    if input.is_empty() {
        return Ok(result);
    }

    let (key, unit) = age_key(age_days, params.month_to_day_rate, params.daily_table_max_age_days);
    let rows = refs.growth_metrics_for_age(child.gender, key, unit)?;
    log::debug!(
        "assessing child {} at {} {} ({} reference rows)",
        child.id,
        key,
        unit,
        rows.len()
    );

    let lookup = AgeLookup {
        rows: &rows,
        child,
        key,
        unit,
    };

    if let Some(height) = input.height {
        let p = lookup.percentile(GrowthMetric::HeightForAge, height)?;
        result.height = describe_generic("height", p, child.gender);
    }
    if let Some(weight) = input.weight {
        let p = lookup.percentile(GrowthMetric::WeightForAge, weight)?;
        result.weight = describe_generic("weight", p, child.gender);
    }
    if let Some(head) = input.head_circumference {
        let p = lookup.percentile(GrowthMetric::HeadCircumferenceForAge, head)?;
        result.head_circumference = describe_generic("head circumference", p, child.gender);
    }
    if let Some(arm) = input.arm_circumference {
        let p = lookup.percentile(GrowthMetric::ArmCircumferenceForAge, arm)?;
        result.arm_circumference = describe_generic("arm circumference", p, child.gender);
    }

    if let (Some(height), Some(weight)) = (input.height, input.weight) {
        if let Some(value) = bmi(height, weight) {
            let p = lookup.percentile(GrowthMetric::Bmi, value)?;
            result.bmi = describe_bmi(p, child.gender);
        }
        result.weight_for_length = assess_weight_for_length(refs, child, height, weight)?;
    }

    Ok(result)
}

fn assess_weight_for_length<R>(
    refs: &R,
    child: &Child,
    height: f64,
    weight: f64,
) -> Result<MetricAssessment, GrowthError>
where
    R: ReferenceTableAccess + ?Sized,
{
    let height_key = (height * 10.0).round() / 10.0;
    let rows = refs.weight_for_length(child.gender, height_key)?;
    let missing = || GrowthError::MissingReference {
        metric: GrowthMetric::WeightForLength.to_string(),
        gender: child.gender,
        key: format!("{height_key} cm"),
    };
    let row = rows
        .iter()
        .find(|r| r.metric == GrowthMetric::WeightForLength)
        .ok_or_else(missing)?;
    log::debug!("weight-for-length row at {:?} cm for {height_key} cm", row.height);

    let p = interpolate_percentile(weight, &row.values).ok_or_else(missing)?;
    Ok(describe_generic("weight for length", p, child.gender))
}

struct AgeLookup<'a> {
    rows: &'a [ReferenceRow],
    child: &'a Child,
    key: u32,
    unit: AgeUnit,
}

impl AgeLookup<'_> {
    fn percentile(&self, metric: GrowthMetric, value: f64) -> Result<f64, GrowthError> {
        self.rows
            .iter()
            .find(|row| row.metric == metric)
            .and_then(|row| interpolate_percentile(value, &row.values))
            .ok_or_else(|| GrowthError::MissingReference {
                metric: metric.to_string(),
                gender: self.child.gender,
                key: format!("{} {}", self.key, self.unit),
            })
    }
}
