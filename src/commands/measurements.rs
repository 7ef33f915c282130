use crate::commands::db::in_transaction;
use crate::commands::growth::{GrowthService, OwnerOrStaff};
use crate::commands::open_data_dir;
use crate::error::{ErrorResponse, GrowthError};
use crate::models::child::{Child, ChildRequest};
use crate::models::growth_result::GrowthResult;
use crate::models::measurement::{Measurement, MeasurementRequest};
use crate::models::requester::RequesterContext;
use chrono::Utc;

pub async fn register_child(
    data_dir: String,
    requester: RequesterContext,
    request: ChildRequest,
) -> Result<Child, ErrorResponse> {
    let (conn, settings) = open_data_dir(&data_dir)?;
    in_transaction::<_, GrowthError, _>(&conn, |store| {
        GrowthService::new(store, &OwnerOrStaff, &settings).register_child(&request, &requester, Utc::now())
    })
    .map_err(ErrorResponse::from)
}

/// Assess a measurement without storing it.
pub async fn assess_measurement(
    data_dir: String,
    requester: RequesterContext,
    child_id: String,
    request: MeasurementRequest,
) -> Result<GrowthResult, ErrorResponse> {
    let (conn, settings) = open_data_dir(&data_dir)?;
    in_transaction::<_, GrowthError, _>(&conn, |store| {
        GrowthService::new(store, &OwnerOrStaff, &settings).assess(&child_id, &request, &requester, Utc::now())
    })
    .map_err(ErrorResponse::from)
}

pub async fn create_measurement(
    data_dir: String,
    requester: RequesterContext,
    child_id: String,
    request: MeasurementRequest,
) -> Result<Measurement, ErrorResponse> {
    let (conn, settings) = open_data_dir(&data_dir)?;
    in_transaction::<_, GrowthError, _>(&conn, |store| {
        GrowthService::new(store, &OwnerOrStaff, &settings).create_measurement(
            &child_id,
            &request,
            &requester,
            Utc::now(),
        )
    })
    .map_err(ErrorResponse::from)
}

pub async fn update_measurement(
    data_dir: String,
    requester: RequesterContext,
    measurement_id: String,
    request: MeasurementRequest,
) -> Result<Measurement, ErrorResponse> {
    let (conn, settings) = open_data_dir(&data_dir)?;
    in_transaction::<_, GrowthError, _>(&conn, |store| {
        GrowthService::new(store, &OwnerOrStaff, &settings).update_measurement(
            &measurement_id,
            &request,
            &requester,
            Utc::now(),
        )
    })
    .map_err(ErrorResponse::from)
}

pub async fn delete_measurement(
    data_dir: String,
    requester: RequesterContext,
    measurement_id: String,
) -> Result<serde_json::Value, ErrorResponse> {
    let (conn, settings) = open_data_dir(&data_dir)?;
    in_transaction::<_, GrowthError, _>(&conn, |store| {
        GrowthService::new(store, &OwnerOrStaff, &settings).delete_measurement(&measurement_id, &requester)
    })
    .map_err(ErrorResponse::from)?;
    Ok(serde_json::json!({"status": "deleted", "id": measurement_id}))
}

pub async fn list_measurements(
    data_dir: String,
    requester: RequesterContext,
    child_id: String,
) -> Result<Vec<Measurement>, ErrorResponse> {
    let (conn, settings) = open_data_dir(&data_dir)?;
    in_transaction::<_, GrowthError, _>(&conn, |store| {
        GrowthService::new(store, &OwnerOrStaff, &settings).list_measurements(&child_id, &requester, Utc::now())
    })
    .map_err(ErrorResponse::from)
}
