use crate::error::{FieldError, GrowthError};
use crate::models::child::{Child, ChildRequest, Gender};
use crate::models::measurement::{MeasurementInput, MeasurementRequest};
use chrono::{DateTime, NaiveDate, Utc};

pub const MAX_CHILD_ID_LEN: usize = 64;

const HEIGHT_RANGE_CM: (f64, f64) = (30.0, 200.0);
const WEIGHT_RANGE_KG: (f64, f64) = (0.5, 150.0);
const HEAD_RANGE_CM: (f64, f64) = (20.0, 65.0);
const ARM_RANGE_CM: (f64, f64) = (5.0, 45.0);

/// RFC 3339, or a bare `YYYY-MM-DD` taken as UTC midnight.
pub fn parse_iso_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Check a measurement payload against the child it belongs to.
///
/// `fallback_taken_at` is used when the request omits `taken_at` (updates).
/// All field problems are reported together.
pub fn validate_measurement_request(
    request: &MeasurementRequest,
    child: &Child,
    fallback_taken_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<MeasurementInput, GrowthError> {
    let mut errors = Vec::new();

    let taken_at = match request.taken_at.as_deref() {
        Some(raw) => match parse_iso_datetime(raw) {
            Some(at) => Some(at),
            None => {
                errors.push(FieldError::new("taken_at", "must be an ISO-8601 date or datetime"));
                None
            }
        },
        None => {
            if fallback_taken_at.is_none() {
                errors.push(FieldError::new("taken_at", "is required"));
            }
            fallback_taken_at
        }
    };

    if let Some(at) = taken_at {
        if at > now {
            errors.push(FieldError::new("taken_at", "cannot be in the future"));
        }
        if at < child.birth_date {
            errors.push(FieldError::new("taken_at", "cannot precede the child's birth date"));
        }
    }

    check_range(&mut errors, "height", request.height, HEIGHT_RANGE_CM, "cm");
    check_range(&mut errors, "weight", request.weight, WEIGHT_RANGE_KG, "kg");
    check_range(
        &mut errors,
        "head_circumference",
        request.head_circumference,
        HEAD_RANGE_CM,
        "cm",
    );
    check_range(
        &mut errors,
        "arm_circumference",
        request.arm_circumference,
        ARM_RANGE_CM,
        "cm",
    );

    let values_present = request.height.is_some()
        || request.weight.is_some()
        || request.head_circumference.is_some()
        || request.arm_circumference.is_some();
    if !values_present && fallback_taken_at.is_none() {
        errors.push(FieldError::new("measurement", "at least one value is required"));
    }

    match taken_at {
        Some(taken_at) if errors.is_empty() => Ok(MeasurementInput {
            taken_at,
            height: request.height,
            weight: request.weight,
            head_circumference: request.head_circumference,
            arm_circumference: request.arm_circumference,
        }),
        _ => Err(GrowthError::Validation(errors)),
    }
}

pub fn validate_child_request(request: &ChildRequest, now: DateTime<Utc>) -> Result<Child, GrowthError> {
    let mut errors = Vec::new();

    let id = request.id.trim();
    if id.is_empty() {
        errors.push(FieldError::new("id", "is required"));
    } else if id.chars().count() > MAX_CHILD_ID_LEN {
        errors.push(FieldError::new(
            "id",
            format!("must be at most {MAX_CHILD_ID_LEN} characters"),
        ));
    }

    let gender = match request.gender.parse::<Gender>() {
        Ok(gender) => Some(gender),
        Err(_) => {
            errors.push(FieldError::new("gender", "must be 'male' or 'female'"));
            None
        }
    };

    let birth_date = match parse_iso_datetime(&request.birth_date) {
        Some(date) if date > now => {
            errors.push(FieldError::new("birth_date", "cannot be in the future"));
            None
        }
        Some(date) => Some(date),
        None => {
            errors.push(FieldError::new("birth_date", "must be an ISO-8601 date"));
            None
        }
    };

    match (gender, birth_date) {
        (Some(gender), Some(birth_date)) if errors.is_empty() => Ok(Child {
            id: id.to_string(),
            birth_date,
            gender,
        }),
        _ => Err(GrowthError::Validation(errors)),
    }
}

fn check_range(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: Option<f64>,
    (min, max): (f64, f64),
    unit: &str,
) {
    let Some(value) = value else {
        return;
    };
    if !value.is_finite() || value < min || value > max {
        errors.push(FieldError::new(
            field,
            format!("must be between {min} and {max} {unit}"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn child() -> Child {
        Child {
            id: "child-1".to_string(),
            birth_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            gender: Gender::Male,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn field_names(err: GrowthError) -> Vec<String> {
        match err {
            GrowthError::Validation(fields) => fields.into_iter().map(|f| f.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn parses_rfc3339_and_bare_dates() {
        let full = parse_iso_datetime("2024-03-01T10:30:00+02:00").expect("rfc3339");
        assert_eq!(full, Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap());
        let date = parse_iso_datetime("2024-03-01").expect("date");
        assert_eq!(date, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert!(parse_iso_datetime("03/01/2024").is_none());
    }

    #[test]
    fn accepts_partial_measurement() {
        let request = MeasurementRequest {
            taken_at: Some("2024-03-01".to_string()),
            weight: Some(5.4),
            ..MeasurementRequest::default()
        };
        let input = validate_measurement_request(&request, &child(), None, now()).expect("valid");
        assert_eq!(input.weight, Some(5.4));
        assert_eq!(input.height, None);
    }

    #[test]
    fn collects_every_field_error() {
        let request = MeasurementRequest {
            taken_at: Some("2025-01-01".to_string()),
            height: Some(250.0),
            weight: Some(f64::NAN),
            ..MeasurementRequest::default()
        };
        let fields = field_names(
            validate_measurement_request(&request, &child(), None, now()).expect_err("invalid"),
        );
        assert_eq!(fields, vec!["taken_at", "height", "weight"]);
    }

    #[test]
    fn rejects_measurement_before_birth_and_empty_payload() {
        let before_birth = MeasurementRequest {
            taken_at: Some("2023-12-31".to_string()),
            height: Some(50.0),
            ..MeasurementRequest::default()
        };
        assert!(validate_measurement_request(&before_birth, &child(), None, now()).is_err());

        let empty = MeasurementRequest {
            taken_at: Some("2024-03-01".to_string()),
            ..MeasurementRequest::default()
        };
        let fields =
            field_names(validate_measurement_request(&empty, &child(), None, now()).expect_err("empty"));
        assert_eq!(fields, vec!["measurement"]);
    }

    #[test]
    fn update_without_taken_at_keeps_stored_instant() {
        let stored = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let request = MeasurementRequest {
            height: Some(58.0),
            ..MeasurementRequest::default()
        };
        let input = validate_measurement_request(&request, &child(), Some(stored), now()).expect("valid");
        assert_eq!(input.taken_at, stored);
    }

    #[test]
    fn validates_child_registration() {
        let ok = ChildRequest {
            id: "kid-7".to_string(),
            birth_date: "2024-01-01".to_string(),
            gender: "Female".to_string(),
        };
        let child = validate_child_request(&ok, now()).expect("valid child");
        assert_eq!(child.gender, Gender::Female);

        let bad = ChildRequest {
            id: "x".repeat(65),
            birth_date: "2030-01-01".to_string(),
            gender: "unknown".to_string(),
        };
        let fields = field_names(validate_child_request(&bad, now()).expect_err("invalid"));
        assert_eq!(fields, vec!["id", "gender", "birth_date"]);
    }
}
