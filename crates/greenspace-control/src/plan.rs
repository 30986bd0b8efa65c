//! Watering plan service.

use std::sync::Arc;

use greenspace_core::{
    Result, ServiceError, TreeClusterId, VehicleId, VehicleType, WateringPlanId,
    WateringPlanStatus, WATER_PER_TREE,
};
use greenspace_events::{Event, EventBus};
use greenspace_store::{
    Repositories, Store, TreeClusterRepository, VehicleRepository, WateringPlan,
    WateringPlanRepository,
};

use crate::lifecycle;
use crate::publish;
use crate::types::{CreatePlanRequest, UpdatePlanRequest};

/// Watering plan CRUD and status lifecycle.
pub struct PlanService<S: Store> {
    store: Arc<S>,
    bus: Arc<EventBus>,
}

impl<S: Store> PlanService<S> {
    /// Create a new plan service.
    #[must_use]
    pub fn new(store: Arc<S>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// List every plan.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_all(&self) -> Result<Vec<WateringPlan>> {
        self.store.with_tx(|tx| Ok(tx.get_all_plans()?))
    }

    /// List the plans in one status.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_all_by_status(&self, status: WateringPlanStatus) -> Result<Vec<WateringPlan>> {
        self.store.with_tx(|tx| Ok(tx.get_all_plans_by_status(status)?))
    }

    /// Get a plan by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the plan doesn't exist.
    pub async fn get_by_id(&self, id: WateringPlanId) -> Result<WateringPlan> {
        self.store.with_tx(|tx| Ok(tx.get_plan(id)?))
    }

    /// Litres delivered by all finished plans.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_total_consumed_water(&self) -> Result<f64> {
        self.store.with_tx(|tx| Ok(tx.get_total_consumed_water()?))
    }

    /// Number of distinct users assigned to any plan.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_all_user_count(&self) -> Result<usize> {
        self.store.with_tx(|tx| Ok(tx.get_all_user_count()?))
    }

    /// Create a plan in status `planned`.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` without a date or clusters, or when a vehicle has
    /// the wrong type, and `NotFound` for a missing cluster or vehicle.
    pub async fn create(&self, request: CreatePlanRequest) -> Result<WateringPlan> {
        let date = request
            .date
            .ok_or_else(|| ServiceError::bad_request("date is required"))?;
        if request.tree_cluster_ids.is_empty() {
            return Err(ServiceError::bad_request("at least one tree cluster is required"));
        }

        let plan = self.store.with_tx(|tx| {
            check_vehicles(tx, request.transporter_id, request.trailer_id)?;
            let water = required_water(tx, &request.tree_cluster_ids)?;
            Ok::<_, ServiceError>(tx.create_plan(|plan| {
                plan.date = date;
                plan.description.clone_from(&request.description);
                plan.status = WateringPlanStatus::Planned;
                plan.tree_cluster_ids.clone_from(&request.tree_cluster_ids);
                plan.user_ids.clone_from(&request.user_ids);
                plan.transporter_id = request.transporter_id;
                plan.trailer_id = request.trailer_id;
                plan.total_water_required = Some(water);
                Ok(true)
            })?)
        })?;

        tracing::info!(
            plan_id = %plan.id,
            date = %plan.date,
            clusters = plan.tree_cluster_ids.len(),
            "Created watering plan"
        );
        Ok(plan)
    }

    /// Replace a plan.
    ///
    /// Publishes `UpdateWateringPlan` when anything changed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the plan doesn't exist, `Conflict` for a
    /// finished or cancelled plan or a forbidden status transition, plus the
    /// errors of [`PlanService::create`].
    pub async fn update(&self, id: WateringPlanId, request: UpdatePlanRequest) -> Result<WateringPlan> {
        if request.tree_cluster_ids.is_empty() {
            return Err(ServiceError::bad_request("at least one tree cluster is required"));
        }

        let (prev, new) = self.store.with_tx(|tx| {
            let prev = tx.get_plan(id)?;
            if lifecycle::is_terminal(prev.status) {
                return Err(ServiceError::conflict(format!(
                    "watering plan {id} is {} and can no longer be edited",
                    prev.status
                )));
            }
            lifecycle::validate_transition(prev.status, request.status)?;
            check_vehicles(tx, request.transporter_id, request.trailer_id)?;
            let water = if prev.tree_cluster_ids == request.tree_cluster_ids {
                prev.total_water_required
            } else {
                Some(required_water(tx, &request.tree_cluster_ids)?)
            };

            let new = tx.update_plan(id, |plan| {
                plan.date = request.date;
                plan.description.clone_from(&request.description);
                plan.status = request.status;
                plan.cancellation_note.clone_from(&request.cancellation_note);
                plan.tree_cluster_ids.clone_from(&request.tree_cluster_ids);
                plan.user_ids.clone_from(&request.user_ids);
                plan.transporter_id = request.transporter_id;
                plan.trailer_id = request.trailer_id;
                plan.total_water_required = water;
                Ok(true)
            })?;
            Ok::<_, ServiceError>((prev, new))
        })?;

        tracing::info!(plan_id = %id, status = %new.status, "Updated watering plan");
        self.publish_update(prev, new.clone()).await;
        Ok(new)
    }

    /// Move a plan to another status.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the plan doesn't exist and `Conflict` for a
    /// forbidden transition.
    pub async fn update_status(
        &self,
        id: WateringPlanId,
        status: WateringPlanStatus,
    ) -> Result<WateringPlan> {
        let (prev, new) = self.store.with_tx(|tx| {
            let prev = tx.get_plan(id)?;
            lifecycle::validate_transition(prev.status, status)?;
            let new = tx.update_plan(id, |plan| {
                if plan.status == status {
                    return Ok(false);
                }
                plan.status = status;
                Ok(true)
            })?;
            Ok::<_, ServiceError>((prev, new))
        })?;

        if prev.status != new.status {
            tracing::info!(plan_id = %id, from = %prev.status, to = %new.status, "Watering plan status changed");
        }
        self.publish_update(prev, new.clone()).await;
        Ok(new)
    }

    /// Delete a plan.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the plan doesn't exist and `Conflict` while it
    /// is active.
    pub async fn delete(&self, id: WateringPlanId) -> Result<()> {
        self.store.with_tx(|tx| {
            let plan = tx.get_plan(id)?;
            if plan.status == WateringPlanStatus::Active {
                return Err(ServiceError::conflict(format!(
                    "watering plan {id} is active and cannot be deleted"
                )));
            }
            tx.delete_plan(id)?;
            Ok(())
        })?;
        tracing::info!(plan_id = %id, "Deleted watering plan");
        Ok(())
    }

    async fn publish_update(&self, prev: WateringPlan, new: WateringPlan) {
        if prev != new {
            publish(&self.bus, Event::UpdateWateringPlan { prev, new }).await;
        }
    }
}

/// Litres needed to water every tree of the given clusters once.
#[allow(clippy::cast_precision_loss)]
fn required_water<T: Repositories>(tx: &T, cluster_ids: &[TreeClusterId]) -> Result<f64> {
    let mut trees = 0usize;
    for id in cluster_ids {
        trees += tx.get_cluster(*id)?.tree_ids.len();
    }
    Ok(trees as f64 * f64::from(WATER_PER_TREE))
}

fn check_vehicles<T: Repositories>(
    tx: &T,
    transporter_id: Option<VehicleId>,
    trailer_id: Option<VehicleId>,
) -> Result<()> {
    for (id, expected) in [
        (transporter_id, VehicleType::Transporter),
        (trailer_id, VehicleType::Trailer),
    ] {
        let Some(id) = id else { continue };
        let vehicle = tx.get_vehicle(id)?;
        if vehicle.vehicle_type != expected {
            return Err(ServiceError::bad_request(format!(
                "vehicle {id} is a {}, expected a {expected}",
                vehicle.vehicle_type
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use crate::types::{TreeRequest, VehicleRequest};
    use chrono::{Duration, Utc};
    use greenspace_core::{ErrorKind, UserId};
    use greenspace_events::EventType;

    async fn seeded(h: &Harness) -> CreatePlanRequest {
        let cluster = h.cluster("Nord").await;
        for n in 0..3 {
            h.trees
                .create(
                    TreeRequest::new(format!("T-{n}"), 2020, 54.70 + f64::from(n) * 0.01, 9.40)
                        .in_cluster(cluster.id),
                )
                .await
                .unwrap();
        }
        CreatePlanRequest {
            date: Some(Utc::now() + Duration::days(1)),
            tree_cluster_ids: vec![cluster.id],
            ..CreatePlanRequest::default()
        }
    }

    #[tokio::test]
    async fn create_computes_required_water() {
        let h = Harness::new();
        let request = seeded(&h).await;
        let plan = h.plans.create(request).await.unwrap();
        assert_eq!(plan.status, WateringPlanStatus::Planned);
        assert_eq!(plan.total_water_required, Some(360.0));
    }

    #[tokio::test]
    async fn create_requires_date_and_clusters() {
        let h = Harness::new();
        let mut request = seeded(&h).await;
        request.date = None;
        assert_eq!(
            h.plans.create(request.clone()).await.unwrap_err().kind(),
            ErrorKind::BadRequest
        );
        request.date = Some(Utc::now());
        request.tree_cluster_ids.clear();
        assert_eq!(
            h.plans.create(request).await.unwrap_err().kind(),
            ErrorKind::BadRequest
        );
    }

    #[tokio::test]
    async fn vehicle_roles_are_checked() {
        let h = Harness::new();
        let mut request = seeded(&h).await;
        let trailer = h
            .vehicles
            .create(VehicleRequest::new("SL-T 1", VehicleType::Trailer, 1000.0))
            .await
            .unwrap();
        request.transporter_id = Some(trailer.id);
        assert_eq!(
            h.plans.create(request.clone()).await.unwrap_err().kind(),
            ErrorKind::BadRequest
        );
        request.transporter_id = Some(VehicleId::new(404));
        assert_eq!(
            h.plans.create(request).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn transitions_follow_lifecycle() {
        let h = Harness::new();
        let plan = h.plans.create(seeded(&h).await).await.unwrap();
        let mut rx = h.subscribe(EventType::UpdateWateringPlan).await;
        let run = h.run_bus();

        let err = h
            .plans
            .update_status(plan.id, WateringPlanStatus::Finished)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let active = h
            .plans
            .update_status(plan.id, WateringPlanStatus::Active)
            .await
            .unwrap();
        assert_eq!(active.status, WateringPlanStatus::Active);
        match h.next_event(&mut rx).await.as_ref() {
            Event::UpdateWateringPlan { prev, new } => {
                assert_eq!(prev.status, WateringPlanStatus::Planned);
                assert_eq!(new.status, WateringPlanStatus::Active);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Same status again: nothing to publish.
        h.plans
            .update_status(plan.id, WateringPlanStatus::Active)
            .await
            .unwrap();
        assert!(h.no_event(&mut rx).await);
        h.stop(run).await;
    }

    #[tokio::test]
    async fn update_recomputes_water_on_membership_change() {
        let h = Harness::new();
        let plan = h.plans.create(seeded(&h).await).await.unwrap();
        let other = h.cluster("Leer").await;

        let mut request = UpdatePlanRequest::from_plan(&plan, WateringPlanStatus::Planned);
        request.tree_cluster_ids.push(other.id);
        request.user_ids = vec![UserId::generate(), UserId::generate()];
        let updated = h.plans.update(plan.id, request).await.unwrap();
        assert_eq!(updated.tree_cluster_ids.len(), 2);
        assert_eq!(updated.total_water_required, Some(360.0));
        assert_eq!(h.plans.get_all_user_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn closed_plan_rejects_edits() {
        let h = Harness::new();
        let plan = h.plans.create(seeded(&h).await).await.unwrap();
        let cancelled = h
            .plans
            .update_status(plan.id, WateringPlanStatus::Cancelled)
            .await
            .unwrap();

        let mut request = UpdatePlanRequest::from_plan(&cancelled, WateringPlanStatus::Cancelled);
        request.description = "Nachtrag".into();
        let err = h.plans.update(plan.id, request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.message().contains("cancelled"));
        assert_eq!(h.plans.get_by_id(plan.id).await.unwrap().description, cancelled.description);
    }

    #[tokio::test]
    async fn active_plan_cannot_be_deleted() {
        let h = Harness::new();
        let plan = h.plans.create(seeded(&h).await).await.unwrap();
        h.plans
            .update_status(plan.id, WateringPlanStatus::Active)
            .await
            .unwrap();
        assert_eq!(
            h.plans.delete(plan.id).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );

        h.plans
            .update_status(plan.id, WateringPlanStatus::Cancelled)
            .await
            .unwrap();
        h.plans.delete(plan.id).await.unwrap();
        assert!(h.plans.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn consumed_water_counts_finished_plans() {
        let h = Harness::new();
        let plan = h.plans.create(seeded(&h).await).await.unwrap();
        assert!(h.plans.get_total_consumed_water().await.unwrap().abs() < f64::EPSILON);

        h.plans
            .update_status(plan.id, WateringPlanStatus::Active)
            .await
            .unwrap();
        h.plans
            .update_status(plan.id, WateringPlanStatus::Finished)
            .await
            .unwrap();
        let consumed = h.plans.get_total_consumed_water().await.unwrap();
        assert!((consumed - 360.0).abs() < f64::EPSILON);
        assert_eq!(
            h.plans
                .get_all_by_status(WateringPlanStatus::Finished)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
