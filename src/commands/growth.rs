use crate::analysis::assessment::assess_growth;
use crate::analysis::quota::{admit, admit_new_child, QuotaDecision};
use crate::analysis::validation::{validate_child_request, validate_measurement_request};
use crate::analysis::velocity::compute_growth_velocity;
use crate::commands::settings::EngineSettings;
use crate::error::GrowthError;
use crate::models::child::{Child, ChildRequest};
use crate::models::growth_result::GrowthResult;
use crate::models::measurement::{Measurement, MeasurementRequest};
use crate::models::requester::{RequesterContext, Role};
use crate::models::subscription::{QuotaAction, Subscription, Tier};
use crate::models::velocity::GrowthVelocityResult;
use crate::store::{GrowthStore, MONTH_TO_DAY_CONVERSION_RATE};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access policy for a child's growth data, supplied by the host.
pub trait CapabilityCheck {
    fn can_write_growth_data(&self, requester: &RequesterContext, owner_id: &str) -> bool;
    fn can_read_growth_data(&self, requester: &RequesterContext, owner_id: &str) -> bool;
}

/// Members reach only the children they registered; doctors and admins reach all.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerOrStaff;

impl CapabilityCheck for OwnerOrStaff {
    fn can_write_growth_data(&self, requester: &RequesterContext, owner_id: &str) -> bool {
        match requester.role {
            Role::Member => requester.user_id == owner_id,
            Role::Doctor | Role::Admin => true,
        }
    }

    fn can_read_growth_data(&self, requester: &RequesterContext, owner_id: &str) -> bool {
        self.can_write_growth_data(requester, owner_id)
    }
}

/// Where a requester stands against one of their tier limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub action: QuotaAction,
    /// False for roles that quotas do not apply to; the other fields are then empty.
    pub metered: bool,
    pub used: Option<u32>,
    pub limit: Option<u32>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

pub struct GrowthService<'a, S: ?Sized> {
    store: &'a S,
    capability: &'a dyn CapabilityCheck,
    settings: &'a EngineSettings,
}

impl<'a, S> GrowthService<'a, S>
where
    S: GrowthStore + ?Sized,
{
    pub fn new(store: &'a S, capability: &'a dyn CapabilityCheck, settings: &'a EngineSettings) -> Self {
        Self {
            store,
            capability,
            settings,
        }
    }

    /// Read on every call; settings supply the fallback.
    fn month_to_day_rate(&self) -> Result<f64, GrowthError> {
        match self.store.get_number(MONTH_TO_DAY_CONVERSION_RATE)? {
            Some(rate) if rate.is_finite() && rate > 0.0 => Ok(rate),
            Some(rate) => {
                log::warn!(
                    "ignoring invalid {MONTH_TO_DAY_CONVERSION_RATE}={rate}; using {}",
                    self.settings.month_to_day_rate
                );
                Ok(self.settings.month_to_day_rate)
            }
            None => {
                log::warn!(
                    "{MONTH_TO_DAY_CONVERSION_RATE} not configured; using {}",
                    self.settings.month_to_day_rate
                );
                Ok(self.settings.month_to_day_rate)
            }
        }
    }

    fn tolerance(&self) -> Duration {
        Duration::seconds(self.settings.subscription_tolerance_seconds)
    }

    fn load_child(&self, child_id: &str) -> Result<Child, GrowthError> {
        self.store
            .child(child_id)?
            .ok_or_else(|| GrowthError::not_found("child", child_id))
    }

    fn authorize(&self, requester: &RequesterContext, child_id: &str, access: Access) -> Result<(), GrowthError> {
        let owner = self
            .store
            .child_owner(child_id)?
            .ok_or_else(|| GrowthError::not_found("child", child_id))?;
        let allowed = match access {
            Access::Read => self.capability.can_read_growth_data(requester, &owner),
            Access::Write => self.capability.can_write_growth_data(requester, &owner),
        };
        if !allowed {
            return Err(GrowthError::Forbidden(format!(
                "{} may not access growth data of child {child_id}",
                requester.user_id
            )));
        }
        Ok(())
    }

    fn subscription_and_tier(&self, user_id: &str) -> Result<(Subscription, Tier), GrowthError> {
        let subscription = self
            .store
            .subscription(user_id)?
            .ok_or_else(|| GrowthError::not_found("subscription", user_id))?;
        let tier = self
            .store
            .tier(subscription.tier_level)?
            .ok_or_else(|| GrowthError::not_found("tier", subscription.tier_level.to_string()))?;
        Ok((subscription, tier))
    }

    fn quota_decision(
        &self,
        requester: &RequesterContext,
        action: QuotaAction,
        now: DateTime<Utc>,
    ) -> Result<Option<QuotaDecision>, GrowthError> {
        if !requester.role.is_metered() {
            return Ok(None);
        }
        let (subscription, tier) = self.subscription_and_tier(&requester.user_id)?;
        let decision = admit(
            self.store,
            &requester.user_id,
            action,
            &tier,
            &subscription,
            now,
            self.tolerance(),
        )?;
        Ok(Some(decision))
    }

    fn admit_action(&self, requester: &RequesterContext, action: QuotaAction, now: DateTime<Utc>) -> Result<(), GrowthError> {
        if let Some(decision) = self.quota_decision(requester, action, now)? {
            decision.into_result()?;
        }
        Ok(())
    }

    fn record(&self, requester: &RequesterContext, action: QuotaAction, now: DateTime<Utc>) -> Result<(), GrowthError> {
        if requester.role.is_metered() {
            self.store.record_action(&requester.user_id, action, now)?;
        }
        Ok(())
    }

    pub fn register_child(
        &self,
        request: &ChildRequest,
        requester: &RequesterContext,
        now: DateTime<Utc>,
    ) -> Result<Child, GrowthError> {
        let child = validate_child_request(request, now)?;
        if requester.role.is_metered() {
            let (_, tier) = self.subscription_and_tier(&requester.user_id)?;
            let existing = self.store.count_children(&requester.user_id)?;
            admit_new_child(&tier, existing)?;
        }
        self.store.insert_child(&requester.user_id, &child)?;
        log::info!("registered child {} for {}", child.id, requester.user_id);
        Ok(child)
    }

    /// Write-path preview: validates, checks the update quota and assesses without persisting.
    pub fn assess(
        &self,
        child_id: &str,
        request: &MeasurementRequest,
        requester: &RequesterContext,
        now: DateTime<Utc>,
    ) -> Result<GrowthResult, GrowthError> {
        self.authorize(requester, child_id, Access::Write)?;
        self.admit_action(requester, QuotaAction::Update, now)?;
        let child = self.load_child(child_id)?;
        let input = validate_measurement_request(request, &child, None, now)?;
        let params = self.settings.assessment_params(self.month_to_day_rate()?);
        assess_growth(self.store, &child, &input, &params)
    }

    pub fn create_measurement(
        &self,
        child_id: &str,
        request: &MeasurementRequest,
        requester: &RequesterContext,
        now: DateTime<Utc>,
    ) -> Result<Measurement, GrowthError> {
        self.authorize(requester, child_id, Access::Write)?;
        self.admit_action(requester, QuotaAction::Update, now)?;
        let child = self.load_child(child_id)?;
        let input = validate_measurement_request(request, &child, None, now)?;
        let params = self.settings.assessment_params(self.month_to_day_rate()?);
        let growth_result = assess_growth(self.store, &child, &input, &params)?;

        let measurement = Measurement {
            id: Uuid::new_v4().to_string(),
            child_id: child.id.clone(),
            taken_at: input.taken_at,
            height: input.height,
            weight: input.weight,
            head_circumference: input.head_circumference,
            arm_circumference: input.arm_circumference,
            growth_result: Some(growth_result),
        };
        self.store.create(&measurement)?;
        self.record(requester, QuotaAction::Update, now)?;
        log::info!("created measurement {} for child {}", measurement.id, child.id);
        Ok(measurement)
    }

    /// Fields present in `request` replace the stored ones; the snapshot is re-assessed.
    pub fn update_measurement(
        &self,
        measurement_id: &str,
        request: &MeasurementRequest,
        requester: &RequesterContext,
        now: DateTime<Utc>,
    ) -> Result<Measurement, GrowthError> {
        let existing = self
            .store
            .measurement(measurement_id)?
            .ok_or_else(|| GrowthError::not_found("measurement", measurement_id))?;
        self.authorize(requester, &existing.child_id, Access::Write)?;
        self.admit_action(requester, QuotaAction::Update, now)?;
        let child = self.load_child(&existing.child_id)?;

        let patch = validate_measurement_request(request, &child, Some(existing.taken_at), now)?;
        let input = patch.merged_over(&existing.input());
        let params = self.settings.assessment_params(self.month_to_day_rate()?);
        let growth_result = assess_growth(self.store, &child, &input, &params)?;

        let updated = Measurement {
            id: existing.id.clone(),
            child_id: existing.child_id.clone(),
            taken_at: input.taken_at,
            height: input.height,
            weight: input.weight,
            head_circumference: input.head_circumference,
            arm_circumference: input.arm_circumference,
            growth_result: Some(growth_result),
        };
        self.store.update(&updated)?;
        self.record(requester, QuotaAction::Update, now)?;
        log::info!("updated measurement {}", updated.id);
        Ok(updated)
    }

    /// Needs write access; consumes no quota.
    pub fn delete_measurement(
        &self,
        measurement_id: &str,
        requester: &RequesterContext,
    ) -> Result<(), GrowthError> {
        let existing = self
            .store
            .measurement(measurement_id)?
            .ok_or_else(|| GrowthError::not_found("measurement", measurement_id))?;
        self.authorize(requester, &existing.child_id, Access::Write)?;
        self.store.delete(measurement_id)?;
        log::info!("deleted measurement {measurement_id}");
        Ok(())
    }

    pub fn list_measurements(
        &self,
        child_id: &str,
        requester: &RequesterContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<Measurement>, GrowthError> {
        self.authorize(requester, child_id, Access::Read)?;
        self.admit_action(requester, QuotaAction::View, now)?;
        let measurements = self.store.list_by_child(child_id)?;
        self.record(requester, QuotaAction::View, now)?;
        Ok(measurements)
    }

    /// Recompute the velocity report from the full history and overwrite the stored one.
    pub fn compute_velocity(
        &self,
        child_id: &str,
        requester: &RequesterContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<GrowthVelocityResult>, GrowthError> {
        self.authorize(requester, child_id, Access::Read)?;
        self.admit_action(requester, QuotaAction::View, now)?;
        let child = self.load_child(child_id)?;
        let snapshots = self.store.list_by_child(child_id)?;
        let params = self.settings.velocity_params(self.month_to_day_rate()?);

        let results = compute_growth_velocity(self.store, &child, &snapshots, &params)?;
        self.store.save_velocity(child_id, &results, now)?;
        self.record(requester, QuotaAction::View, now)?;
        log::info!(
            "recomputed velocity for child {child_id} from {} snapshots",
            snapshots.len()
        );
        Ok(results)
    }

    pub fn check_update_quota(&self, requester: &RequesterContext, now: DateTime<Utc>) -> Result<QuotaStatus, GrowthError> {
        self.quota_status(requester, QuotaAction::Update, now)
    }

    pub fn check_view_quota(&self, requester: &RequesterContext, now: DateTime<Utc>) -> Result<QuotaStatus, GrowthError> {
        self.quota_status(requester, QuotaAction::View, now)
    }

    fn quota_status(
        &self,
        requester: &RequesterContext,
        action: QuotaAction,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, GrowthError> {
        match self.quota_decision(requester, action, now)? {
            None => Ok(QuotaStatus {
                action,
                metered: false,
                used: None,
                limit: None,
                window_start: None,
                window_end: None,
            }),
            Some(QuotaDecision::Allowed {
                window,
                used,
                limit,
            }) => Ok(QuotaStatus {
                action,
                metered: true,
                used: Some(used),
                limit: Some(limit),
                window_start: Some(window.start),
                window_end: Some(window.end),
            }),
            Some(QuotaDecision::Denied(reason)) => Err(reason.into()),
        }
    }
}
