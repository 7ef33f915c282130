use crate::analysis::assessment::{
    AssessmentParams, DEFAULT_DAILY_TABLE_MAX_AGE_DAYS, DEFAULT_MONTH_TO_DAY_RATE,
};
use crate::analysis::quota::DEFAULT_SUBSCRIPTION_TOLERANCE_SECONDS;
use crate::analysis::velocity::{VelocityParams, DEFAULT_VELOCITY_MAX_MONTHS};
use crate::commands::db::data_dir_path;
use crate::error::ErrorResponse;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: i64 = 2;

/// Typed view of `settings.json` consumed by the engines.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Used only when the database has no `MONTH_TO_DAY_CONVERSION_RATE`.
    pub month_to_day_rate: f64,
    pub daily_table_max_age_days: u32,
    pub velocity_max_months: u32,
    pub velocity_match_max_distance_days: Option<f64>,
    pub subscription_tolerance_seconds: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            month_to_day_rate: DEFAULT_MONTH_TO_DAY_RATE,
            daily_table_max_age_days: DEFAULT_DAILY_TABLE_MAX_AGE_DAYS,
            velocity_max_months: DEFAULT_VELOCITY_MAX_MONTHS,
            velocity_match_max_distance_days: None,
            subscription_tolerance_seconds: DEFAULT_SUBSCRIPTION_TOLERANCE_SECONDS,
        }
    }
}

impl EngineSettings {
    pub fn assessment_params(&self, month_to_day_rate: f64) -> AssessmentParams {
        AssessmentParams {
            month_to_day_rate,
            daily_table_max_age_days: self.daily_table_max_age_days,
        }
    }

    pub fn velocity_params(&self, month_to_day_rate: f64) -> VelocityParams {
        VelocityParams {
            month_to_day_rate,
            max_months: self.velocity_max_months,
            max_match_distance_days: self.velocity_match_max_distance_days,
        }
    }
}

pub async fn get_settings(data_dir: String) -> Result<Value, ErrorResponse> {
    load_settings_from_disk(&data_dir).map_err(settings_error)
}

pub async fn save_settings(data_dir: String, settings: Value) -> Result<Value, ErrorResponse> {
    save_settings_to_disk(&data_dir, settings).map_err(settings_error)
}

fn settings_error(message: String) -> ErrorResponse {
    ErrorResponse::internal(format!("settings: {message}"))
}

pub fn load_engine_settings(data_dir: &str) -> Result<EngineSettings, String> {
    let settings = load_settings_from_disk(data_dir)?;
    Ok(engine_settings_from_value(&settings))
}

fn engine_settings_from_value(settings: &Value) -> EngineSettings {
    let defaults = EngineSettings::default();
    EngineSettings {
        month_to_day_rate: settings
            .get("monthToDayConversionRate")
            .and_then(Value::as_f64)
            .unwrap_or(defaults.month_to_day_rate),
        daily_table_max_age_days: settings
            .get("dailyTableMaxAgeDays")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .unwrap_or(defaults.daily_table_max_age_days),
        velocity_max_months: settings
            .get("velocityMaxMonths")
            .and_then(Value::as_u64)
            .unwrap_or(u64::from(defaults.velocity_max_months))
            .clamp(2, 24) as u32,
        velocity_match_max_distance_days: settings
            .get("velocityMatchMaxDistanceDays")
            .and_then(Value::as_f64),
        subscription_tolerance_seconds: settings
            .get("subscriptionToleranceSeconds")
            .and_then(Value::as_i64)
            .unwrap_or(defaults.subscription_tolerance_seconds),
    }
}

pub fn load_settings_from_disk(data_dir: &str) -> Result<Value, String> {
    let path = settings_path(data_dir);
    ensure_data_dir(data_dir)?;

    let original = if path.exists() {
        let raw = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read settings.json: {e}"))?;
        serde_json::from_str::<Value>(&raw).unwrap_or_else(|e| {
            log::warn!("settings.json is not valid JSON ({e}); using defaults");
            json!({})
        })
    } else {
        json!({})
    };

    let migrated = migrate_settings(original.clone());
    if migrated != original || !path.exists() {
        write_settings_file(&path, &migrated)?;
    }

    Ok(migrated)
}

pub fn save_settings_to_disk(data_dir: &str, settings: Value) -> Result<Value, String> {
    let path = settings_path(data_dir);
    ensure_data_dir(data_dir)?;

    let mut merged = load_settings_from_disk(data_dir).unwrap_or_else(|_| default_settings());
    merge_settings(&mut merged, &settings);

    let migrated = migrate_settings(merged);
    write_settings_file(&path, &migrated)?;
    Ok(migrated)
}

fn settings_path(data_dir: &str) -> PathBuf {
    data_dir_path(data_dir).join("settings.json")
}

fn ensure_data_dir(data_dir: &str) -> Result<(), String> {
    fs::create_dir_all(data_dir_path(data_dir))
        .map_err(|e| format!("Failed to create data directory: {e}"))
}

fn write_settings_file(path: &Path, settings: &Value) -> Result<(), String> {
    let raw = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {e}"))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write settings.json: {e}"))
}

fn migrate_settings(input: Value) -> Value {
    let defaults = default_settings();
    let mut out = match input {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    let version = out
        .get("schema_version")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    if version < 1 {
        rename_legacy_rate(&mut out);
    }

    if version < 2 {
        // V2 introduces the optional nearest-snapshot bound, off by default.
        ensure_key(&mut out, "velocityMatchMaxDistanceDays", Value::Null);
    }

    deep_merge_defaults(&mut out, &defaults);
    sanitize_settings(&mut out);
    if let Some(obj) = out.as_object_mut() {
        obj.insert("schema_version".to_string(), json!(SETTINGS_SCHEMA_VERSION));
    }

    out
}

fn default_settings() -> Value {
    json!({
        "schema_version": SETTINGS_SCHEMA_VERSION,
        "monthToDayConversionRate": DEFAULT_MONTH_TO_DAY_RATE,
        "dailyTableMaxAgeDays": DEFAULT_DAILY_TABLE_MAX_AGE_DAYS,
        "velocityMaxMonths": DEFAULT_VELOCITY_MAX_MONTHS,
        "velocityMatchMaxDistanceDays": null,
        "subscriptionToleranceSeconds": DEFAULT_SUBSCRIPTION_TOLERANCE_SECONDS
    })
}

fn deep_merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target_obj), Some(default_obj)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default_value) in default_obj {
        match target_obj.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default_value.is_object() {
                    deep_merge_defaults(existing, default_value);
                }
            }
            None => {
                target_obj.insert(key.clone(), default_value.clone());
            }
        }
    }
}

fn ensure_key(target: &mut Value, key: &str, value: Value) {
    if let Some(obj) = target.as_object_mut() {
        obj.entry(key.to_string()).or_insert(value);
    }
}

fn merge_settings(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_obj), Value::Object(incoming_obj)) => {
            for (key, value) in incoming_obj {
                if let Some(existing) = target_obj.get_mut(key) {
                    merge_settings(existing, value);
                } else {
                    target_obj.insert(key.clone(), value.clone());
                }
            }
        }
        (target_slot, incoming_value) => {
            *target_slot = incoming_value.clone();
        }
    }
}

/// V0 files stored the rate as `monthConversionRate`.
fn rename_legacy_rate(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };
    if let Some(legacy) = obj.remove("monthConversionRate") {
        obj.entry("monthToDayConversionRate".to_string()).or_insert(legacy);
    }
}

fn sanitize_settings(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    clamp_f64(obj, "monthToDayConversionRate", 28.0, 31.0, DEFAULT_MONTH_TO_DAY_RATE);
    clamp_u64(
        obj,
        "dailyTableMaxAgeDays",
        0,
        3650,
        u64::from(DEFAULT_DAILY_TABLE_MAX_AGE_DAYS),
    );
    clamp_u64(obj, "velocityMaxMonths", 2, 24, u64::from(DEFAULT_VELOCITY_MAX_MONTHS));
    clamp_u64(
        obj,
        "subscriptionToleranceSeconds",
        0,
        86_400,
        DEFAULT_SUBSCRIPTION_TOLERANCE_SECONDS as u64,
    );

    // Null disables the bound; anything else must be a positive number of days.
    let bound = obj
        .get("velocityMatchMaxDistanceDays")
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v > 0.0);
    obj.insert(
        "velocityMatchMaxDistanceDays".to_string(),
        bound.map(|v| json!(v)).unwrap_or(Value::Null),
    );
}

fn clamp_u64(map: &mut Map<String, Value>, key: &str, min: u64, max: u64, default: u64) {
    let raw = map.get(key).and_then(Value::as_u64).unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}

fn clamp_f64(map: &mut Map<String, Value>, key: &str, min: f64, max: f64, default: f64) {
    let raw = map
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_legacy_rate_key() {
        let input = json!({
            "schema_version": 0,
            "monthConversionRate": 30.0
        });

        let migrated = migrate_settings(input);

        assert_eq!(migrated["monthToDayConversionRate"], json!(30.0));
        assert!(migrated.get("monthConversionRate").is_none());
        assert_eq!(migrated["velocityMatchMaxDistanceDays"], Value::Null);
        assert_eq!(
            migrated
                .get("schema_version")
                .and_then(Value::as_i64)
                .unwrap(),
            SETTINGS_SCHEMA_VERSION
        );
    }

    #[test]
    fn merges_partial_settings_without_losing_existing_values() {
        let mut existing = default_settings();
        merge_settings(&mut existing, &json!({ "velocityMaxMonths": 6 }));
        let migrated = migrate_settings(existing);

        assert_eq!(migrated["velocityMaxMonths"], json!(6));
        assert_eq!(migrated["dailyTableMaxAgeDays"], json!(1856));
        assert_eq!(migrated["subscriptionToleranceSeconds"], json!(300));
    }

    #[test]
    fn sanitizes_out_of_range_values() {
        let migrated = migrate_settings(json!({
            "schema_version": 2,
            "velocityMaxMonths": 100,
            "monthToDayConversionRate": "thirty",
            "velocityMatchMaxDistanceDays": -4
        }));

        assert_eq!(migrated["velocityMaxMonths"], json!(24));
        assert_eq!(migrated["monthToDayConversionRate"], json!(DEFAULT_MONTH_TO_DAY_RATE));
        assert_eq!(migrated["velocityMatchMaxDistanceDays"], Value::Null);
    }

    #[test]
    fn engine_settings_read_typed_values() {
        let settings = migrate_settings(json!({ "velocityMatchMaxDistanceDays": 10.5 }));
        let engine = engine_settings_from_value(&settings);
        assert_eq!(engine.velocity_match_max_distance_days, Some(10.5));
        assert_eq!(engine.velocity_max_months, 12);
        assert_eq!(engine.velocity_params(30.0).month_to_day_rate, 30.0);
    }

    #[test]
    fn settings_file_is_created_on_first_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = dir.path().to_string_lossy().to_string();

        let loaded = load_engine_settings(&data_dir).expect("load");
        assert_eq!(loaded, EngineSettings::default());
        assert!(settings_path(&data_dir).exists());
    }
}
