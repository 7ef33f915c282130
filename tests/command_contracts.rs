use chrono::{Duration, Utc};
use growthlens_lib::commands::db::{get_db_connection, set_config_value, upsert_subscription, upsert_tier};
use growthlens_lib::commands::measurements::{
    assess_measurement, create_measurement, delete_measurement, list_measurements, register_child,
    update_measurement,
};
use growthlens_lib::commands::quota::{check_update_quota, check_view_quota};
use growthlens_lib::commands::reference::import_reference_tables;
use growthlens_lib::commands::settings::{get_settings, save_settings};
use growthlens_lib::commands::velocity::{compute_velocity, ChildLocks};
use growthlens_lib::models::child::ChildRequest;
use growthlens_lib::models::growth_result::GrowthLevel;
use growthlens_lib::models::measurement::MeasurementRequest;
use growthlens_lib::models::requester::{RequesterContext, Role};
use growthlens_lib::models::subscription::{ActionLimit, QuotaAction, Subscription, Tier};
use growthlens_lib::store::MONTH_TO_DAY_CONVERSION_RATE;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

const PARENT: &str = "parent-1";
const CHILD: &str = "child-1";

fn reference_bundle() -> serde_json::Value {
    let weight_row = |age: u32, p50: f64| {
        json!({
            "metric": "weight_for_age",
            "gender": "male",
            "age_in_days": age,
            "age_in_months": null,
            "height": null,
            "l": 0.3,
            "m": p50,
            "s": 0.12,
            "values": [
                {"percentile": 3.0, "value": p50 - 1.0},
                {"percentile": 50.0, "value": p50},
                {"percentile": 97.0, "value": p50 + 1.0}
            ]
        })
    };

    json!({
        "rows": [weight_row(0, 3.5), weight_row(61, 5.6)],
        "velocity_rows": [{
            "metric": "weight",
            "gender": "male",
            "first_interval": {"months": 0, "weeks": 4, "days": 0},
            "last_interval": {"months": 2, "weeks": 0, "days": 0},
            "l": 1.0,
            "m": 0.8,
            "s": 0.2,
            "delta": 0.0,
            "values": [
                {"percentile": 97.0, "value": 1.2},
                {"percentile": 3.0, "value": 0.4},
                {"percentile": 50.0, "value": 0.8}
            ]
        }]
    })
}

/// Data dir with a free tier (3 updates and 10 views per 30 days), a free
/// subscription for `PARENT` and the reference bundle imported.
async fn create_data_dir() -> (TempDir, String) {
    growthlens_lib::init_logging();
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let data_dir = temp_dir.path().to_string_lossy().to_string();

    {
        let conn = get_db_connection(&data_dir).expect("open database");
        upsert_tier(
            &conn,
            &Tier {
                tier_level: 0,
                children_limit: 1,
                update_limit: ActionLimit {
                    value: 3,
                    time_days: 30,
                    description: "3 updates per month".to_string(),
                },
                view_limit: ActionLimit {
                    value: 10,
                    time_days: 30,
                    description: "10 views per month".to_string(),
                },
            },
        )
        .expect("seed tier");
        upsert_subscription(&conn, &Subscription::free(PARENT, Utc::now() - Duration::days(1)))
            .expect("seed subscription");
        set_config_value(&conn, MONTH_TO_DAY_CONVERSION_RATE, 30.4375).expect("seed rate");
    }

    let bundle_path = temp_dir.path().join("reference.json");
    fs::write(&bundle_path, reference_bundle().to_string()).expect("write bundle");
    let summary = import_reference_tables(data_dir.clone(), bundle_path.to_string_lossy().to_string())
        .await
        .expect("import reference tables");
    assert_eq!(summary.row_count, 2);
    assert_eq!(summary.velocity_row_count, 1);

    (temp_dir, data_dir)
}

async fn register_default_child(data_dir: &str) {
    register_child(
        data_dir.to_string(),
        RequesterContext::member(PARENT),
        ChildRequest {
            id: CHILD.to_string(),
            birth_date: "2024-01-01".to_string(),
            gender: "male".to_string(),
        },
    )
    .await
    .expect("register child");
}

fn weight_at(taken_at: &str, weight: f64) -> MeasurementRequest {
    MeasurementRequest {
        taken_at: Some(taken_at.to_string()),
        weight: Some(weight),
        ..MeasurementRequest::default()
    }
}

#[tokio::test]
async fn measurement_commands_support_full_crud_contract() {
    let (_tmp, data_dir) = create_data_dir().await;
    register_default_child(&data_dir).await;
    let parent = RequesterContext::member(PARENT);

    let created = create_measurement(
        data_dir.clone(),
        parent.clone(),
        CHILD.to_string(),
        weight_at("2024-03-02", 5.6),
    )
    .await
    .expect("create measurement");
    let growth = created.growth_result.as_ref().expect("growth result");
    assert_eq!(growth.weight.percentile, 50.0);
    assert_eq!(growth.weight.level, GrowthLevel::Average);
    assert_eq!(growth.height.level, GrowthLevel::NotAvailable);

    let updated = update_measurement(
        data_dir.clone(),
        parent.clone(),
        created.id.clone(),
        MeasurementRequest {
            weight: Some(6.6),
            ..MeasurementRequest::default()
        },
    )
    .await
    .expect("update measurement");
    assert_eq!(updated.taken_at, created.taken_at);
    assert_eq!(updated.weight, Some(6.6));
    let growth = updated.growth_result.as_ref().expect("growth result");
    assert_eq!(growth.weight.percentile, 97.0);
    assert_eq!(growth.weight.level, GrowthLevel::High);

    let listed = list_measurements(data_dir.clone(), parent.clone(), CHILD.to_string())
        .await
        .expect("list measurements");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.id);

    let deleted = delete_measurement(data_dir.clone(), parent.clone(), created.id.clone())
        .await
        .expect("delete measurement");
    assert_eq!(deleted["status"], json!("deleted"));

    let missing = delete_measurement(data_dir.clone(), parent, created.id)
        .await
        .expect_err("second delete fails");
    assert_eq!(missing.code, "NOT_FOUND");
}

#[tokio::test]
async fn duplicate_instant_is_a_conflict_and_quota_caps_updates() {
    let (_tmp, data_dir) = create_data_dir().await;
    register_default_child(&data_dir).await;
    let parent = RequesterContext::member(PARENT);

    create_measurement(data_dir.clone(), parent.clone(), CHILD.to_string(), weight_at("2024-01-01", 3.5))
        .await
        .expect("first measurement");
    let duplicate = create_measurement(
        data_dir.clone(),
        parent.clone(),
        CHILD.to_string(),
        weight_at("2024-01-01", 3.6),
    )
    .await
    .expect_err("duplicate instant");
    assert_eq!(duplicate.code, "CONFLICT");

    // The failed insert was rolled back with its quota record.
    let status = check_update_quota(data_dir.clone(), parent.clone())
        .await
        .expect("update quota");
    assert!(status.metered);
    assert_eq!(status.used, Some(1));
    assert_eq!(status.limit, Some(3));

    create_measurement(data_dir.clone(), parent.clone(), CHILD.to_string(), weight_at("2024-03-02", 5.6))
        .await
        .expect("second measurement");
    let listed = list_measurements(data_dir.clone(), parent.clone(), CHILD.to_string())
        .await
        .expect("list measurements");
    update_measurement(
        data_dir.clone(),
        parent.clone(),
        listed[1].id.clone(),
        MeasurementRequest {
            weight: Some(5.7),
            ..MeasurementRequest::default()
        },
    )
    .await
    .expect("third update");

    let denied = update_measurement(
        data_dir.clone(),
        parent.clone(),
        listed[1].id.clone(),
        MeasurementRequest {
            weight: Some(5.8),
            ..MeasurementRequest::default()
        },
    )
    .await
    .expect_err("fourth update is over the limit");
    assert_eq!(denied.code, "FORBIDDEN");
    assert_eq!(denied.error, "tier limit exceeded");

    let view = check_view_quota(data_dir.clone(), parent).await.expect("view quota");
    assert_eq!(view.action, QuotaAction::View);
    assert_eq!(view.used, Some(1));
}

#[tokio::test]
async fn access_is_limited_to_owner_and_staff() {
    let (_tmp, data_dir) = create_data_dir().await;
    register_default_child(&data_dir).await;

    let stranger = list_measurements(
        data_dir.clone(),
        RequesterContext::member("parent-2"),
        CHILD.to_string(),
    )
    .await
    .expect_err("other member is rejected");
    assert_eq!(stranger.code, "FORBIDDEN");

    let doctor = RequesterContext::with_role("doctor-1", Role::Doctor);
    let listed = list_measurements(data_dir.clone(), doctor.clone(), CHILD.to_string())
        .await
        .expect("doctor lists without a subscription");
    assert!(listed.is_empty());

    let status = check_view_quota(data_dir.clone(), doctor).await.expect("doctor quota");
    assert!(!status.metered);
    assert_eq!(status.limit, None);

    let unknown = list_measurements(
        data_dir.clone(),
        RequesterContext::member(PARENT),
        "no-such-child".to_string(),
    )
    .await
    .expect_err("unknown child");
    assert_eq!(unknown.code, "NOT_FOUND");
}

#[tokio::test]
async fn free_tier_allows_a_single_child() {
    let (_tmp, data_dir) = create_data_dir().await;
    register_default_child(&data_dir).await;

    let second = register_child(
        data_dir.clone(),
        RequesterContext::member(PARENT),
        ChildRequest {
            id: "child-2".to_string(),
            birth_date: "2024-06-01".to_string(),
            gender: "female".to_string(),
        },
    )
    .await
    .expect_err("children limit reached");
    assert_eq!(second.code, "FORBIDDEN");
}

#[tokio::test]
async fn assess_previews_without_storing() {
    let (_tmp, data_dir) = create_data_dir().await;
    register_default_child(&data_dir).await;
    let parent = RequesterContext::member(PARENT);

    let result = assess_measurement(
        data_dir.clone(),
        parent.clone(),
        CHILD.to_string(),
        weight_at("2024-01-01", 3.0),
    )
    .await
    .expect("assess measurement");
    assert_eq!(result.weight.percentile, 26.5);
    assert_eq!(result.weight.level, GrowthLevel::Average);

    let invalid = assess_measurement(
        data_dir.clone(),
        parent.clone(),
        CHILD.to_string(),
        MeasurementRequest {
            taken_at: Some("yesterday".to_string()),
            weight: Some(900.0),
            ..MeasurementRequest::default()
        },
    )
    .await
    .expect_err("invalid payload");
    assert_eq!(invalid.code, "VALIDATION_ERROR");
    assert_eq!(invalid.details.len(), 2);

    let status = check_update_quota(data_dir.clone(), parent.clone())
        .await
        .expect("update quota");
    assert_eq!(status.used, Some(0));
    let listed = list_measurements(data_dir, parent, CHILD.to_string())
        .await
        .expect("list measurements");
    assert!(listed.is_empty());
}

#[tokio::test]
async fn missing_reference_row_is_an_internal_error() {
    let (_tmp, data_dir) = create_data_dir().await;
    register_default_child(&data_dir).await;

    let failure = create_measurement(
        data_dir.clone(),
        RequesterContext::member(PARENT),
        CHILD.to_string(),
        weight_at("2024-02-10", 4.5),
    )
    .await
    .expect_err("no weight row at 40 days");
    assert_eq!(failure.code, "INTERNAL_ERROR");
    assert_eq!(failure.error, "internal error");
}

#[tokio::test]
async fn velocity_command_reports_configured_windows() {
    let (_tmp, data_dir) = create_data_dir().await;
    register_default_child(&data_dir).await;
    let parent = RequesterContext::member(PARENT);

    let saved = save_settings(data_dir.clone(), json!({"velocityMaxMonths": 6}))
        .await
        .expect("save settings");
    assert_eq!(saved["velocityMaxMonths"], json!(6));

    create_measurement(data_dir.clone(), parent.clone(), CHILD.to_string(), weight_at("2024-01-01", 5.0))
        .await
        .expect("birth measurement");
    create_measurement(data_dir.clone(), parent.clone(), CHILD.to_string(), weight_at("2024-03-02", 6.2))
        .await
        .expect("two month measurement");

    let locks = ChildLocks::new();
    let report = compute_velocity(&locks, data_dir.clone(), parent, CHILD.to_string())
        .await
        .expect("compute velocity");

    let periods: Vec<&str> = report.iter().map(|r| r.period.as_str()).collect();
    assert_eq!(
        periods,
        vec![
            "0-4 weeks",
            "4 weeks-2 months",
            "2-3 months",
            "3-4 months",
            "4-5 months",
            "5-6 months"
        ]
    );

    assert_eq!(report[0].weight.velocity, None);
    let window = &report[1];
    assert_eq!(window.weight.velocity, Some(0.6));
    assert_eq!(window.weight.percentile, 26.36);
    assert_eq!(window.height.velocity, None);
    assert!(report[2..].iter().all(|r| r.weight.velocity.is_none()));
}

#[tokio::test]
async fn settings_commands_round_trip_and_merge_partial_updates() {
    let (_tmp, data_dir) = create_data_dir().await;

    let initial = get_settings(data_dir.clone()).await.expect("load settings");
    assert_eq!(initial["monthToDayConversionRate"], json!(30.4375));
    assert!(initial["velocityMatchMaxDistanceDays"].is_null());

    let saved = save_settings(
        data_dir.clone(),
        json!({
            "velocityMatchMaxDistanceDays": 14.0,
            "subscriptionToleranceSeconds": 999_999
        }),
    )
    .await
    .expect("save settings");

    assert_eq!(saved["velocityMatchMaxDistanceDays"], json!(14.0));
    assert_eq!(saved["subscriptionToleranceSeconds"], json!(86_400));
    assert_eq!(saved["dailyTableMaxAgeDays"], initial["dailyTableMaxAgeDays"]);

    let reloaded = get_settings(data_dir).await.expect("reload settings");
    assert_eq!(reloaded, saved);
}

#[tokio::test]
async fn malformed_reference_bundle_is_rejected() {
    let (tmp, data_dir) = create_data_dir().await;

    let bad_path = tmp.path().join("bad.json");
    fs::write(&bad_path, "{\"rows\": [{\"metric\": \"shoe_size\"}]}").expect("write bad bundle");
    let err = import_reference_tables(data_dir.clone(), bad_path.to_string_lossy().to_string())
        .await
        .expect_err("unknown metric");
    assert_eq!(err.code, "VALIDATION_ERROR");
    assert_eq!(err.details[0].field, "bundle");

    let missing = import_reference_tables(data_dir, tmp.path().join("nope.json").to_string_lossy().to_string())
        .await
        .expect_err("missing file");
    assert_eq!(missing.details[0].field, "bundle_path");
}
