use crate::commands::db::in_transaction;
use crate::commands::growth::{GrowthService, OwnerOrStaff, QuotaStatus};
use crate::commands::open_data_dir;
use crate::error::{ErrorResponse, GrowthError};
use crate::models::requester::RequesterContext;
use chrono::Utc;

pub async fn check_update_quota(
    data_dir: String,
    requester: RequesterContext,
) -> Result<QuotaStatus, ErrorResponse> {
    let (conn, settings) = open_data_dir(&data_dir)?;
    in_transaction::<_, GrowthError, _>(&conn, |store| {
        GrowthService::new(store, &OwnerOrStaff, &settings).check_update_quota(&requester, Utc::now())
    })
    .map_err(ErrorResponse::from)
}

pub async fn check_view_quota(
    data_dir: String,
    requester: RequesterContext,
) -> Result<QuotaStatus, ErrorResponse> {
    let (conn, settings) = open_data_dir(&data_dir)?;
    in_transaction::<_, GrowthError, _>(&conn, |store| {
        GrowthService::new(store, &OwnerOrStaff, &settings).check_view_quota(&requester, Utc::now())
    })
    .map_err(ErrorResponse::from)
}
