//! Narrow collaborator interfaces consumed by the engines.
//!
//! The SQLite implementation lives in `commands::db`; `memory` holds an in-process
//! implementation used by tests and by hosts that keep their own persistence.

pub mod memory;

use crate::models::child::{Child, Gender};
use crate::models::measurement::Measurement;
use crate::models::reference::{AgeUnit, ReferenceRow, ReferenceVelocityRow};
use crate::models::subscription::{Plan, QuotaAction, Subscription, Tier};
use crate::models::velocity::GrowthVelocityResult;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Config key holding the day-per-month conversion constant.
pub const MONTH_TO_DAY_CONVERSION_RATE: &str = "MONTH_TO_DAY_CONVERSION_RATE";

/// Tabulated weight-for-length heights further than this from the requested one do not match.
pub const WEIGHT_FOR_LENGTH_MAX_GAP_CM: f64 = 0.5;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("store db error: {0}")]
    Db(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store invalid data: {0}")]
    Invalid(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Invalid(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only reference tables. Bulk-loaded offline.
pub trait ReferenceTableAccess {
    /// All percentile-for-age rows for `gender` at `age_key` (days or months).
    fn growth_metrics_for_age(
        &self,
        gender: Gender,
        age_key: u32,
        unit: AgeUnit,
    ) -> StoreResult<Vec<ReferenceRow>>;

    fn growth_velocity(&self, gender: Gender) -> StoreResult<Vec<ReferenceVelocityRow>>;

    /// Weight-for-length rows for the tabulated height nearest to `height` (within 0.5 cm).
    fn weight_for_length(&self, gender: Gender, height: f64) -> StoreResult<Vec<ReferenceRow>>;
}

pub trait ConfigAccess {
    fn get_number(&self, key: &str) -> StoreResult<Option<f64>>;
}

pub trait MeasurementStore {
    fn child(&self, child_id: &str) -> StoreResult<Option<Child>>;

    /// The user that registered the child.
    fn child_owner(&self, child_id: &str) -> StoreResult<Option<String>>;

    /// Fails with `StoreError::Duplicate` when the child id is taken.
    fn insert_child(&self, owner_id: &str, child: &Child) -> StoreResult<()>;

    fn measurement(&self, measurement_id: &str) -> StoreResult<Option<Measurement>>;

    /// Snapshots for a child ordered by `taken_at` ascending.
    fn list_by_child(&self, child_id: &str) -> StoreResult<Vec<Measurement>>;

    /// Fails with `StoreError::Duplicate` when (child_id, taken_at) already exists.
    fn create(&self, measurement: &Measurement) -> StoreResult<()>;

    fn update(&self, measurement: &Measurement) -> StoreResult<()>;

    fn delete(&self, measurement_id: &str) -> StoreResult<()>;

    /// Replaces any stored velocity report for the child.
    fn save_velocity(
        &self,
        child_id: &str,
        results: &[GrowthVelocityResult],
        computed_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    fn load_velocity(&self, child_id: &str) -> StoreResult<Option<Vec<GrowthVelocityResult>>>;
}

pub trait SubscriptionStore {
    fn subscription(&self, user_id: &str) -> StoreResult<Option<Subscription>>;

    fn tier(&self, tier_level: u8) -> StoreResult<Option<Tier>>;

    fn plan(&self, plan_id: &str) -> StoreResult<Option<Plan>>;

    /// Actions of `kind` by `user_id` with `start <= occurred_at < end`.
    fn count_actions(
        &self,
        user_id: &str,
        kind: QuotaAction,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<u32>;

    fn record_action(&self, user_id: &str, kind: QuotaAction, at: DateTime<Utc>) -> StoreResult<()>;

    /// Children already registered by the user; used for the tier's children limit.
    fn count_children(&self, user_id: &str) -> StoreResult<u32>;
}

/// Everything the growth service needs from persistence.
pub trait GrowthStore:
    ReferenceTableAccess + ConfigAccess + MeasurementStore + SubscriptionStore
{
}

impl<T> GrowthStore for T where
    T: ReferenceTableAccess + ConfigAccess + MeasurementStore + SubscriptionStore
{
}
