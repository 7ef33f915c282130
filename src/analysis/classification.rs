use crate::models::child::Gender;
use crate::models::growth_result::{GrowthLevel, MetricAssessment};

/// Five-band level for height, weight, head, arm and weight-for-length.
/// Upper bounds are exclusive: 5.0 is Below Average, 95.0 is High.
pub fn classify_generic(percentile: f64) -> GrowthLevel {
    if percentile < 5.0 {
        GrowthLevel::Low
    } else if percentile < 15.0 {
        GrowthLevel::BelowAverage
    } else if percentile < 85.0 {
        GrowthLevel::Average
    } else if percentile < 95.0 {
        GrowthLevel::AboveAverage
    } else {
        GrowthLevel::High
    }
}

/// BMI bands: below 15 Underweight, [15, 95) Healthy, 95 and up Obese.
///
/// Only these three labels are produced. Healthy runs straight into Obese, so
/// `GrowthLevel::Overweight` is never returned.
pub fn classify_bmi(percentile: f64) -> GrowthLevel {
    if percentile < 15.0 {
        GrowthLevel::Underweight
    } else if percentile < 95.0 {
        GrowthLevel::Healthy
    } else {
        GrowthLevel::Obese
    }
}

/// "1st", "2nd", "23rd", "11th". Fractional percentiles are truncated.
pub fn ordinal(percentile: f64) -> String {
    let n = percentile.max(0.0).floor() as u64;
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

/// Assessment for one of the five-band metrics.
pub fn describe_generic(metric_label: &str, percentile: f64, gender: Gender) -> MetricAssessment {
    let level = classify_generic(percentile);
    let description = format!(
        "Your {} is in the {} percentile for {}, meaning their {} is greater than {}% of {} the same age. Level: {}.",
        gender.child_noun(),
        ordinal(percentile),
        metric_label,
        metric_label,
        ordinal_share(percentile),
        gender.peer_noun(),
        level.label(),
    );
    MetricAssessment {
        percentile,
        description,
        level,
    }
}

pub fn describe_bmi(percentile: f64, gender: Gender) -> MetricAssessment {
    let level = classify_bmi(percentile);
    let description = format!(
        "Your {}'s BMI is in the {} percentile compared to {} the same age, which is considered {}.",
        gender.child_noun(),
        ordinal(percentile),
        gender.peer_noun(),
        level.label().to_lowercase(),
    );
    MetricAssessment {
        percentile,
        description,
        level,
    }
}

/// Description for a computed velocity.
pub fn describe_velocity(
    metric_label: &str,
    unit: &str,
    velocity: f64,
    percentile: f64,
    gender: Gender,
) -> String {
    format!(
        "Your {}'s {} changed by {:.2} {}/month, in the {} percentile of {} over the same period.",
        gender.child_noun(),
        metric_label,
        velocity,
        unit,
        ordinal(percentile),
        gender.peer_noun(),
    )
}

fn ordinal_share(percentile: f64) -> String {
    let rounded = (percentile * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_band_upper_bounds_are_exclusive() {
        assert_eq!(classify_generic(4.99), GrowthLevel::Low);
        assert_eq!(classify_generic(5.0), GrowthLevel::BelowAverage);
        assert_eq!(classify_generic(15.0), GrowthLevel::Average);
        assert_eq!(classify_generic(84.99), GrowthLevel::Average);
        assert_eq!(classify_generic(85.0), GrowthLevel::AboveAverage);
        assert_eq!(classify_generic(95.0), GrowthLevel::High);
        assert_eq!(classify_generic(100.0), GrowthLevel::High);
    }

    #[test]
    fn bmi_bands() {
        assert_eq!(classify_bmi(0.0), GrowthLevel::Underweight);
        assert_eq!(classify_bmi(14.99), GrowthLevel::Underweight);
        assert_eq!(classify_bmi(15.0), GrowthLevel::Healthy);
        assert_eq!(classify_bmi(94.99), GrowthLevel::Healthy);
        assert_eq!(classify_bmi(95.0), GrowthLevel::Obese);
    }

    #[test]
    fn bmi_never_reports_overweight() {
        let levels: Vec<GrowthLevel> = (0..=1000).map(|i| classify_bmi(i as f64 / 10.0)).collect();
        assert!(!levels.contains(&GrowthLevel::Overweight));
        assert!(levels.contains(&GrowthLevel::Underweight));
        assert!(levels.contains(&GrowthLevel::Healthy));
        assert!(levels.contains(&GrowthLevel::Obese));
    }

    #[test]
    fn ordinal_suffixes() {
        assert_eq!(ordinal(1.0), "1st");
        assert_eq!(ordinal(2.4), "2nd");
        assert_eq!(ordinal(3.0), "3rd");
        assert_eq!(ordinal(11.0), "11th");
        assert_eq!(ordinal(12.0), "12th");
        assert_eq!(ordinal(13.9), "13th");
        assert_eq!(ordinal(21.0), "21st");
        assert_eq!(ordinal(67.5), "67th");
    }

    #[test]
    fn description_uses_gendered_nouns() {
        let assessment = describe_generic("height", 50.0, Gender::Female);
        assert!(assessment.description.contains("daughter"));
        assert!(assessment.description.contains("50th"));
        assert!(assessment.description.contains("girls"));
        assert_eq!(assessment.level, GrowthLevel::Average);

        let bmi = describe_bmi(96.0, Gender::Male);
        assert!(bmi.description.contains("son's BMI"));
        assert!(bmi.description.ends_with("obese."));
    }
}
