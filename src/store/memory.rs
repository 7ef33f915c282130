use super::{
    ConfigAccess, MeasurementStore, ReferenceTableAccess, StoreError, StoreResult,
    SubscriptionStore, WEIGHT_FOR_LENGTH_MAX_GAP_CM,
};
use crate::models::child::{Child, Gender};
use crate::models::measurement::Measurement;
use crate::models::reference::{AgeUnit, GrowthMetric, ReferenceRow, ReferenceVelocityRow};
use crate::models::subscription::{Plan, QuotaAction, Subscription, Tier};
use crate::models::velocity::GrowthVelocityResult;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    children: HashMap<String, (String, Child)>,
    measurements: Vec<Measurement>,
    reference_rows: Vec<ReferenceRow>,
    velocity_rows: Vec<ReferenceVelocityRow>,
    velocity_results: HashMap<String, Vec<GrowthVelocityResult>>,
    tiers: HashMap<u8, Tier>,
    plans: HashMap<String, Plan>,
    subscriptions: HashMap<String, Subscription>,
    actions: Vec<(String, QuotaAction, DateTime<Utc>)>,
    config: HashMap<String, f64>,
}

/// In-process implementation of every store trait.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Db("memory store lock poisoned".to_string()))
    }

    pub fn add_reference_rows(&self, rows: impl IntoIterator<Item = ReferenceRow>) -> StoreResult<()> {
        self.lock()?.reference_rows.extend(rows);
        Ok(())
    }

    pub fn add_velocity_rows(
        &self,
        rows: impl IntoIterator<Item = ReferenceVelocityRow>,
    ) -> StoreResult<()> {
        self.lock()?.velocity_rows.extend(rows);
        Ok(())
    }

    pub fn put_tier(&self, tier: Tier) -> StoreResult<()> {
        self.lock()?.tiers.insert(tier.tier_level, tier);
        Ok(())
    }

    pub fn put_plan(&self, plan: Plan) -> StoreResult<()> {
        self.lock()?.plans.insert(plan.id.clone(), plan);
        Ok(())
    }

    pub fn put_subscription(&self, subscription: Subscription) -> StoreResult<()> {
        self.lock()?
            .subscriptions
            .insert(subscription.user_id.clone(), subscription);
        Ok(())
    }

    pub fn set_config(&self, key: &str, value: f64) -> StoreResult<()> {
        self.lock()?.config.insert(key.to_string(), value);
        Ok(())
    }

    pub fn action_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.actions.len())
    }
}

impl ReferenceTableAccess for InMemoryStore {
    fn growth_metrics_for_age(
        &self,
        gender: Gender,
        age_key: u32,
        unit: AgeUnit,
    ) -> StoreResult<Vec<ReferenceRow>> {
        let state = self.lock()?;
        Ok(state
            .reference_rows
            .iter()
            .filter(|row| row.gender == gender && row.metric != GrowthMetric::WeightForLength)
            .filter(|row| match unit {
                AgeUnit::Days => row.age_in_days == Some(age_key),
                AgeUnit::Months => row.age_in_months == Some(age_key),
            })
            .cloned()
            .collect())
    }

    fn growth_velocity(&self, gender: Gender) -> StoreResult<Vec<ReferenceVelocityRow>> {
        let state = self.lock()?;
        Ok(state
            .velocity_rows
            .iter()
            .filter(|row| row.gender == gender)
            .cloned()
            .collect())
    }

    fn weight_for_length(&self, gender: Gender, height: f64) -> StoreResult<Vec<ReferenceRow>> {
        let state = self.lock()?;
        let candidates: Vec<&ReferenceRow> = state
            .reference_rows
            .iter()
            .filter(|row| row.gender == gender && row.metric == GrowthMetric::WeightForLength)
            .filter(|row| {
                row.height
                    .map(|h| (h - height).abs() <= WEIGHT_FOR_LENGTH_MAX_GAP_CM + 1e-9)
                    .unwrap_or(false)
            })
            .collect();

        // Closest tabulated height; the lower one on a tie.
        let nearest = candidates
            .iter()
            .filter_map(|row| row.height)
            .min_by(|a, b| {
                (a - height)
                    .abs()
                    .total_cmp(&(b - height).abs())
                    .then(a.total_cmp(b))
            });
        let Some(nearest) = nearest else {
            return Ok(Vec::new());
        };

        Ok(candidates
            .into_iter()
            .filter(|row| row.height.map(|h| (h - nearest).abs() < 1e-9).unwrap_or(false))
            .cloned()
            .collect())
    }
}

impl ConfigAccess for InMemoryStore {
    fn get_number(&self, key: &str) -> StoreResult<Option<f64>> {
        Ok(self.lock()?.config.get(key).copied())
    }
}

impl MeasurementStore for InMemoryStore {
    fn child(&self, child_id: &str) -> StoreResult<Option<Child>> {
        Ok(self
            .lock()?
            .children
            .get(child_id)
            .map(|(_, child)| child.clone()))
    }

    fn child_owner(&self, child_id: &str) -> StoreResult<Option<String>> {
        Ok(self
            .lock()?
            .children
            .get(child_id)
            .map(|(owner, _)| owner.clone()))
    }

    fn insert_child(&self, owner_id: &str, child: &Child) -> StoreResult<()> {
        let mut state = self.lock()?;
        if state.children.contains_key(&child.id) {
            return Err(StoreError::Duplicate(format!("child {} already exists", child.id)));
        }
        state
            .children
            .insert(child.id.clone(), (owner_id.to_string(), child.clone()));
        Ok(())
    }

    fn measurement(&self, measurement_id: &str) -> StoreResult<Option<Measurement>> {
        Ok(self
            .lock()?
            .measurements
            .iter()
            .find(|m| m.id == measurement_id)
            .cloned())
    }

    fn list_by_child(&self, child_id: &str) -> StoreResult<Vec<Measurement>> {
        let state = self.lock()?;
        let mut items: Vec<Measurement> = state
            .measurements
            .iter()
            .filter(|m| m.child_id == child_id)
            .cloned()
            .collect();
        items.sort_by_key(|m| m.taken_at);
        Ok(items)
    }

    fn create(&self, measurement: &Measurement) -> StoreResult<()> {
        let mut state = self.lock()?;
        let clash = state.measurements.iter().any(|m| {
            m.id == measurement.id
                || (m.child_id == measurement.child_id
                    && m.taken_at.timestamp_millis() == measurement.taken_at.timestamp_millis())
        });
        if clash {
            return Err(StoreError::Duplicate(format!(
                "measurement for child {} at {} already exists",
                measurement.child_id, measurement.taken_at
            )));
        }
        state.measurements.push(measurement.clone());
        Ok(())
    }

    fn update(&self, measurement: &Measurement) -> StoreResult<()> {
        let mut state = self.lock()?;
        let clash = state.measurements.iter().any(|m| {
            m.id != measurement.id
                && m.child_id == measurement.child_id
                && m.taken_at.timestamp_millis() == measurement.taken_at.timestamp_millis()
        });
        if clash {
            return Err(StoreError::Duplicate(format!(
                "measurement for child {} at {} already exists",
                measurement.child_id, measurement.taken_at
            )));
        }
        let existing = state
            .measurements
            .iter_mut()
            .find(|m| m.id == measurement.id)
            .ok_or_else(|| StoreError::NotFound(format!("measurement {}", measurement.id)))?;
        *existing = measurement.clone();
        Ok(())
    }

    fn delete(&self, measurement_id: &str) -> StoreResult<()> {
        let mut state = self.lock()?;
        let before = state.measurements.len();
        state.measurements.retain(|m| m.id != measurement_id);
        if state.measurements.len() == before {
            return Err(StoreError::NotFound(format!("measurement {measurement_id}")));
        }
        Ok(())
    }

    fn save_velocity(
        &self,
        child_id: &str,
        results: &[GrowthVelocityResult],
        _computed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.lock()?
            .velocity_results
            .insert(child_id.to_string(), results.to_vec());
        Ok(())
    }

    fn load_velocity(&self, child_id: &str) -> StoreResult<Option<Vec<GrowthVelocityResult>>> {
        Ok(self.lock()?.velocity_results.get(child_id).cloned())
    }
}

impl SubscriptionStore for InMemoryStore {
    fn subscription(&self, user_id: &str) -> StoreResult<Option<Subscription>> {
        Ok(self.lock()?.subscriptions.get(user_id).cloned())
    }

    fn tier(&self, tier_level: u8) -> StoreResult<Option<Tier>> {
        Ok(self.lock()?.tiers.get(&tier_level).cloned())
    }

    fn plan(&self, plan_id: &str) -> StoreResult<Option<Plan>> {
        Ok(self.lock()?.plans.get(plan_id).cloned())
    }

    fn count_actions(
        &self,
        user_id: &str,
        kind: QuotaAction,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let state = self.lock()?;
        let count = state
            .actions
            .iter()
            .filter(|(user, action, at)| user == user_id && *action == kind && *at >= start && *at < end)
            .count();
        Ok(count as u32)
    }

    fn record_action(&self, user_id: &str, kind: QuotaAction, at: DateTime<Utc>) -> StoreResult<()> {
        self.lock()?.actions.push((user_id.to_string(), kind, at));
        Ok(())
    }

    fn count_children(&self, user_id: &str) -> StoreResult<u32> {
        let state = self.lock()?;
        Ok(state
            .children
            .values()
            .filter(|(owner, _)| owner == user_id)
            .count() as u32)
    }
}
