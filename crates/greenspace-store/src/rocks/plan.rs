use std::collections::HashSet;

use chrono::Utc;
use greenspace_core::{WateringPlanId, WateringPlanStatus};

use super::StoreTx;
use crate::error::{Result, StoreError};
use crate::keys;
use crate::repository::WateringPlanRepository;
use crate::schema::{cf, seq};
use crate::types::WateringPlan;

impl WateringPlanRepository for StoreTx<'_> {
    fn get_all_plans(&self) -> Result<Vec<WateringPlan>> {
        self.scan_values(cf::WATERING_PLANS)
    }

    fn get_plan(&self, id: WateringPlanId) -> Result<WateringPlan> {
        self.get(cf::WATERING_PLANS, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("watering plan", id))
    }

    fn get_all_plans_by_status(&self, status: WateringPlanStatus) -> Result<Vec<WateringPlan>> {
        let mut plans = Vec::new();
        for (key, _) in self.scan_prefix(cf::PLANS_BY_STATUS, &keys::status_prefix(status))? {
            let Some(plan_id) = keys::plan_id_from_status_key(&key) else {
                continue;
            };
            if let Some(plan) = self.get(cf::WATERING_PLANS, &plan_id.to_be_bytes())? {
                plans.push(plan);
            }
        }
        Ok(plans)
    }

    fn create_plan<F>(&self, f: F) -> Result<WateringPlan>
    where
        F: FnOnce(&mut WateringPlan) -> Result<bool>,
    {
        let id = WateringPlanId::new(self.next_id_i32(seq::WATERING_PLAN)?);
        let now = Utc::now();
        let mut plan = WateringPlan::blank(id, now);
        if !f(&mut plan)? {
            return Err(StoreError::Aborted);
        }
        plan.id = id;
        plan.created_at = now;
        plan.updated_at = now;

        self.put(cf::WATERING_PLANS, &id.to_be_bytes(), &plan)?;
        self.put_raw(cf::PLANS_BY_STATUS, &keys::status_plan_key(plan.status, id), &[])?;
        tracing::debug!(plan_id = %id, status = %plan.status, "Created watering plan");
        Ok(plan)
    }

    fn update_plan<F>(&self, id: WateringPlanId, f: F) -> Result<WateringPlan>
    where
        F: FnOnce(&mut WateringPlan) -> Result<bool>,
    {
        let prev: WateringPlan = self
            .get_for_update(cf::WATERING_PLANS, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("watering plan", id))?;

        let mut plan = prev.clone();
        if !f(&mut plan)? {
            return Ok(prev);
        }
        plan.id = prev.id;
        plan.created_at = prev.created_at;
        plan.updated_at = Utc::now();

        self.put(cf::WATERING_PLANS, &id.to_be_bytes(), &plan)?;

        // Update status index if status changed
        if prev.status != plan.status {
            self.delete(cf::PLANS_BY_STATUS, &keys::status_plan_key(prev.status, id))?;
            self.put_raw(cf::PLANS_BY_STATUS, &keys::status_plan_key(plan.status, id), &[])?;
        }
        Ok(plan)
    }

    fn delete_plan(&self, id: WateringPlanId) -> Result<()> {
        let plan: WateringPlan = self
            .get_for_update(cf::WATERING_PLANS, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("watering plan", id))?;
        self.delete(cf::PLANS_BY_STATUS, &keys::status_plan_key(plan.status, id))?;
        self.delete(cf::WATERING_PLANS, &id.to_be_bytes())?;
        tracing::debug!(plan_id = %id, "Deleted watering plan");
        Ok(())
    }

    fn get_total_consumed_water(&self) -> Result<f64> {
        Ok(self
            .get_all_plans_by_status(WateringPlanStatus::Finished)?
            .iter()
            .filter_map(|p| p.total_water_required)
            .sum())
    }

    fn get_all_user_count(&self) -> Result<usize> {
        let users: HashSet<_> = self
            .get_all_plans()?
            .into_iter()
            .flat_map(|p| p.user_ids)
            .collect();
        Ok(users.len())
    }
}
