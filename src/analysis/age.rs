use crate::models::reference::AgeUnit;
use chrono::{DateTime, Utc};

const MS_PER_DAY: i64 = 86_400_000;

/// Whole days elapsed from `birth_date` to `as_of`. Negative when `as_of` precedes birth.
pub fn age_in_days(birth_date: DateTime<Utc>, as_of: DateTime<Utc>) -> i64 {
    let elapsed_ms = (as_of - birth_date).num_milliseconds();
    elapsed_ms.div_euclid(MS_PER_DAY)
}

/// Fractional days between two instants.
pub fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / MS_PER_DAY as f64
}

/// Age key for the percentile-for-age tables: exact day up to `daily_max_days`,
/// completed months afterwards.
pub fn age_key(age_days: i64, month_to_day_rate: f64, daily_max_days: u32) -> (u32, AgeUnit) {
    let days = age_days.max(0) as u32;
    if days <= daily_max_days {
        return (days, AgeUnit::Days);
    }
    let months = (days as f64 / month_to_day_rate).floor() as u32;
    (months, AgeUnit::Months)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn age_in_days_floors_partial_days() {
        let birth = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let as_of = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 0).unwrap();
        assert_eq!(age_in_days(birth, as_of), 30);
    }

    #[test]
    fn before_birth_is_negative() {
        let birth = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let as_of = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(age_in_days(birth, as_of), -1);
    }

    #[test]
    fn daily_table_up_to_crossover_then_months() {
        assert_eq!(age_key(1856, 30.4375, 1856), (1856, AgeUnit::Days));
        // 1857 / 30.4375 = 61.01
        assert_eq!(age_key(1857, 30.4375, 1856), (61, AgeUnit::Months));
        assert_eq!(age_key(0, 30.4375, 1856), (0, AgeUnit::Days));
    }
}
