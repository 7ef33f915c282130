use crate::analysis::age::days_between;
use crate::analysis::assessment::DEFAULT_MONTH_TO_DAY_RATE;
use crate::analysis::classification::describe_velocity;
use crate::analysis::interpolation::{interpolate_percentile, round2};
use crate::error::GrowthError;
use crate::models::child::Child;
use crate::models::measurement::Measurement;
use crate::models::reference::{IntervalBoundary, ReferenceVelocityRow, VelocityMetric};
use crate::models::velocity::{GrowthVelocityResult, VelocityAssessment};
use crate::store::ReferenceTableAccess;
use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_VELOCITY_MAX_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityParams {
    pub month_to_day_rate: f64,
    /// End of the last monthly window.
    pub max_months: u32,
    /// Snapshots further than this from a boundary are not matched. `None` matches
    /// the globally closest snapshot however far away it is.
    pub max_match_distance_days: Option<f64>,
}

impl Default for VelocityParams {
    fn default() -> Self {
        Self {
            month_to_day_rate: DEFAULT_MONTH_TO_DAY_RATE,
            max_months: DEFAULT_VELOCITY_MAX_MONTHS,
            max_match_distance_days: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeWindow {
    pub first: IntervalBoundary,
    pub last: IntervalBoundary,
}

impl AgeWindow {
    /// "0-4 weeks", "4 weeks-2 months", "2-3 months".
    pub fn period_label(&self) -> String {
        let first = &self.first;
        let last = &self.last;
        if first.weeks == 0 && first.months == 0 && first.days == 0 {
            return format!("0-{}", last.label());
        }
        let first_only_months = first.weeks == 0 && first.days == 0;
        let last_only_months = last.weeks == 0 && last.days == 0;
        if first_only_months && last_only_months {
            return format!("{}-{} months", first.months, last.months);
        }
        format!("{}-{}", first.label(), last.label())
    }
}

/// 0-4 weeks, 4 weeks-2 months, then one-month windows up to `max_months`.
pub fn canonical_windows(max_months: u32) -> Vec<AgeWindow> {
    let mut windows = vec![
        AgeWindow {
            first: IntervalBoundary::default(),
            last: IntervalBoundary::weeks(4),
        },
        AgeWindow {
            first: IntervalBoundary::weeks(4),
            last: IntervalBoundary::months(2),
        },
    ];
    for month in 2..max_months {
        windows.push(AgeWindow {
            first: IntervalBoundary::months(month),
            last: IntervalBoundary::months(month + 1),
        });
    }
    windows
}

/// Rebuild the velocity report for a child from its full measurement history.
///
/// Never fails on sparse history: unmatched boundaries, missing metrics and
/// non-positive elapsed time all yield "Insufficient data". A computed velocity
/// with no matching reference row is `MissingReference`.
pub fn compute_growth_velocity<R>(
    refs: &R,
    child: &Child,
    snapshots: &[Measurement],
    params: &VelocityParams,
) -> Result<Vec<GrowthVelocityResult>, GrowthError>
where
    R: ReferenceTableAccess + ?Sized,
{
    let mut ordered: Vec<&Measurement> = snapshots.iter().collect();
    ordered.sort_by_key(|m| m.taken_at);

    let velocity_rows = refs.growth_velocity(child.gender)?;
    let rate = params.month_to_day_rate;

    let mut results = Vec::new();
    for window in canonical_windows(params.max_months) {
        let start_date = boundary_instant(child.birth_date, window.first, rate);
        let end_date = boundary_instant(child.birth_date, window.last, rate);
        let start = closest_snapshot(&ordered, start_date, params.max_match_distance_days);
        let end = closest_snapshot(&ordered, end_date, params.max_match_distance_days);
        log::debug!(
            "velocity window {} for child {}: start={:?} end={:?}",
            window.period_label(),
            child.id,
            start.map(|m| m.taken_at),
            end.map(|m| m.taken_at)
        );

        let assess = |metric: VelocityMetric| -> Result<VelocityAssessment, GrowthError> {
            let velocity = match (start, end) {
                (Some(s), Some(e)) => metric_velocity(s, e, metric, rate),
                _ => None,
            };
            let Some(velocity) = velocity else {
                return Ok(VelocityAssessment::insufficient());
            };
            let row = find_row(&velocity_rows, metric, window).ok_or_else(|| {
                GrowthError::MissingReference {
                    metric: format!("{}_velocity", metric.as_str()),
                    gender: child.gender,
                    key: window.period_label(),
                }
            })?;
            let percentile = interpolate_percentile(velocity, &row.values).ok_or_else(|| {
                GrowthError::MissingReference {
                    metric: format!("{}_velocity", metric.as_str()),
                    gender: child.gender,
                    key: window.period_label(),
                }
            })?;
            Ok(VelocityAssessment {
                percentile,
                velocity: Some(round2(velocity)),
                description: describe_velocity(
                    metric.label(),
                    metric.unit(),
                    velocity,
                    percentile,
                    child.gender,
                ),
            })
        };

        let height = assess(VelocityMetric::Height)?;
        let weight = assess(VelocityMetric::Weight)?;
        let head_circumference = assess(VelocityMetric::HeadCircumference)?;

        results.push(GrowthVelocityResult {
            period: window.period_label(),
            start_date,
            end_date,
            height,
            weight,
            head_circumference,
        });
    }

    Ok(results)
}

fn boundary_instant(birth: DateTime<Utc>, boundary: IntervalBoundary, rate: f64) -> DateTime<Utc> {
    let ms = (boundary.to_days(rate) * 86_400_000.0).round() as i64;
    birth + Duration::milliseconds(ms)
}

/// Closest snapshot by absolute distance; the earlier one wins a tie.
/// `ordered` must be sorted by `taken_at`.
fn closest_snapshot<'a>(
    ordered: &[&'a Measurement],
    target: DateTime<Utc>,
    max_distance_days: Option<f64>,
) -> Option<&'a Measurement> {
    let mut best: Option<(&'a Measurement, f64)> = None;
    for &snapshot in ordered {
        let distance = days_between(target, snapshot.taken_at).abs();
        if let Some(limit) = max_distance_days {
            if distance > limit {
                continue;
            }
        }
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((snapshot, distance)),
        }
    }
    best.map(|(snapshot, _)| snapshot)
}

fn metric_value(snapshot: &Measurement, metric: VelocityMetric) -> Option<f64> {
    match metric {
        VelocityMetric::Height => snapshot.height,
        VelocityMetric::Weight => snapshot.weight,
        VelocityMetric::HeadCircumference => snapshot.head_circumference,
    }
}

fn metric_velocity(
    start: &Measurement,
    end: &Measurement,
    metric: VelocityMetric,
    rate: f64,
) -> Option<f64> {
    let from = metric_value(start, metric)?;
    let to = metric_value(end, metric)?;
    let elapsed_months = days_between(start.taken_at, end.taken_at) / rate;
    if elapsed_months <= 0.0 {
        return None;
    }
    Some((to - from) / elapsed_months)
}

fn find_row(
    rows: &[ReferenceVelocityRow],
    metric: VelocityMetric,
    window: AgeWindow,
) -> Option<&ReferenceVelocityRow> {
    rows.iter().find(|row| {
        row.metric == metric && row.first_interval == window.first && row.last_interval == window.last
    })
}
