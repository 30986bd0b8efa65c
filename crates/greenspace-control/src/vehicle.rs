//! Vehicle service.

use std::sync::Arc;

use greenspace_core::{Result, ServiceError, VehicleId, VehicleType};
use greenspace_store::{Store, Vehicle, VehicleRepository};

use crate::types::VehicleRequest;

/// CRUD over watering vehicles.
pub struct VehicleService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> VehicleService<S> {
    /// Create a new vehicle service.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// List vehicles, optionally only those of one type.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_all(&self, vehicle_type: Option<VehicleType>) -> Result<Vec<Vehicle>> {
        self.store.with_tx(|tx| match vehicle_type {
            Some(vehicle_type) => Ok(tx.get_vehicles_by_type(vehicle_type)?),
            None => Ok(tx.get_all_vehicles()?),
        })
    }

    /// Get a vehicle by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the vehicle doesn't exist.
    pub async fn get_by_id(&self, id: VehicleId) -> Result<Vehicle> {
        self.store.with_tx(|tx| Ok(tx.get_vehicle(id)?))
    }

    /// Get a vehicle by its number plate.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no vehicle has this plate.
    pub async fn get_by_plate(&self, number_plate: &str) -> Result<Vehicle> {
        self.store.with_tx(|tx| Ok(tx.get_vehicle_by_plate(number_plate)?))
    }

    /// Register a vehicle.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an empty plate or a capacity that is not
    /// positive, and `Conflict` if the plate is taken.
    pub async fn create(&self, request: VehicleRequest) -> Result<Vehicle> {
        request.validate()?;
        let vehicle = self.store.with_tx(|tx| {
            Ok::<_, ServiceError>(tx.create_vehicle(|vehicle| {
                apply(vehicle, &request);
                Ok(true)
            })?)
        })?;
        tracing::info!(vehicle_id = %vehicle.id, plate = %vehicle.number_plate, "Created vehicle");
        Ok(vehicle)
    }

    /// Replace a vehicle's fields.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the vehicle doesn't exist, plus the errors of
    /// [`VehicleService::create`].
    pub async fn update(&self, id: VehicleId, request: VehicleRequest) -> Result<Vehicle> {
        request.validate()?;
        let vehicle = self.store.with_tx(|tx| {
            Ok::<_, ServiceError>(tx.update_vehicle(id, |vehicle| {
                apply(vehicle, &request);
                Ok(true)
            })?)
        })?;
        tracing::info!(vehicle_id = %id, "Updated vehicle");
        Ok(vehicle)
    }

    /// Delete a vehicle.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the vehicle doesn't exist.
    pub async fn delete(&self, id: VehicleId) -> Result<()> {
        self.store.with_tx(|tx| Ok::<_, ServiceError>(tx.delete_vehicle(id)?))?;
        tracing::info!(vehicle_id = %id, "Deleted vehicle");
        Ok(())
    }
}

fn apply(vehicle: &mut Vehicle, request: &VehicleRequest) {
    vehicle.number_plate = request.number_plate.trim().to_string();
    vehicle.description.clone_from(&request.description);
    vehicle.water_capacity = request.water_capacity;
    vehicle.vehicle_type = request.vehicle_type;
    vehicle.status = request.status;
    vehicle.model.clone_from(&request.model);
    vehicle.driving_license = request.driving_license;
    vehicle.height = request.height;
    vehicle.length = request.length;
    vehicle.width = request.width;
    vehicle.weight = request.weight;
}
