//! Regions, vehicles and images: records with few cross-references.

use chrono::Utc;
use greenspace_core::geo::{validate_latitude, validate_longitude};
use greenspace_core::{ImageId, RegionId, VehicleId, VehicleType};

use super::StoreTx;
use crate::error::{Result, StoreError};
use crate::geometry::polygon_contains;
use crate::repository::{ImageRepository, RegionRepository, TreeRepository, VehicleRepository};
use crate::schema::{cf, seq};
use crate::types::{Image, Region, Vehicle};

impl RegionRepository for StoreTx<'_> {
    fn get_all_regions(&self) -> Result<Vec<Region>> {
        self.scan_values(cf::REGIONS)
    }

    fn get_region(&self, id: RegionId) -> Result<Region> {
        self.get(cf::REGIONS, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("region", id))
    }

    fn get_region_by_point(&self, latitude: f64, longitude: f64) -> Result<Option<Region>> {
        Ok(self
            .get_all_regions()?
            .into_iter()
            .find(|r| polygon_contains(&r.polygon, latitude, longitude)))
    }

    fn create_region(&self, name: &str, polygon: Vec<[f64; 2]>) -> Result<Region> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation("region name must not be empty".into()));
        }
        if polygon.len() < 3 {
            return Err(StoreError::Validation(
                "region polygon needs at least three vertices".into(),
            ));
        }
        for [lon, lat] in &polygon {
            validate_latitude(*lat)?;
            validate_longitude(*lon)?;
        }
        if self.get_all_regions()?.iter().any(|r| r.name == name) {
            return Err(StoreError::Duplicate(format!("region {name} already exists")));
        }

        let id = RegionId::new(self.next_id_i32(seq::REGION)?);
        let now = Utc::now();
        let region = Region {
            id,
            name: name.to_string(),
            polygon,
            created_at: now,
            updated_at: now,
        };
        self.put(cf::REGIONS, &id.to_be_bytes(), &region)?;
        tracing::debug!(region_id = %id, name = %region.name, "Created region");
        Ok(region)
    }

    fn delete_region(&self, id: RegionId) -> Result<()> {
        if self.get_raw_for_update(cf::REGIONS, &id.to_be_bytes())?.is_none() {
            return Err(StoreError::not_found("region", id));
        }
        self.delete(cf::REGIONS, &id.to_be_bytes())
    }
}

impl StoreTx<'_> {
    fn validate_vehicle(vehicle: &Vehicle) -> Result<()> {
        if vehicle.number_plate.trim().is_empty() {
            return Err(StoreError::Validation("number plate must not be empty".into()));
        }
        if vehicle.water_capacity <= 0.0 {
            return Err(StoreError::Validation(
                "water capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    fn claim_plate(&self, plate: &str, id: VehicleId) -> Result<()> {
        if let Some(raw) = self.get_raw_for_update(cf::VEHICLES_BY_PLATE, plate.as_bytes())? {
            let owner = <[u8; 4]>::try_from(raw.as_slice())
                .map(VehicleId::from_be_bytes)
                .map_err(|_| StoreError::Serialization(format!("corrupt plate index {plate}")))?;
            if owner != id {
                return Err(StoreError::Duplicate(format!(
                    "number plate {plate} is already registered"
                )));
            }
        }
        self.put_raw(cf::VEHICLES_BY_PLATE, plate.as_bytes(), &id.to_be_bytes())
    }
}

impl VehicleRepository for StoreTx<'_> {
    fn get_all_vehicles(&self) -> Result<Vec<Vehicle>> {
        self.scan_values(cf::VEHICLES)
    }

    fn get_vehicles_by_type(&self, vehicle_type: VehicleType) -> Result<Vec<Vehicle>> {
        Ok(self
            .get_all_vehicles()?
            .into_iter()
            .filter(|v| v.vehicle_type == vehicle_type)
            .collect())
    }

    fn get_vehicle(&self, id: VehicleId) -> Result<Vehicle> {
        self.get(cf::VEHICLES, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("vehicle", id))
    }

    fn get_vehicle_by_plate(&self, number_plate: &str) -> Result<Vehicle> {
        let raw = self
            .get_raw(cf::VEHICLES_BY_PLATE, number_plate.as_bytes())?
            .ok_or_else(|| StoreError::not_found("vehicle", number_plate))?;
        let id = <[u8; 4]>::try_from(raw.as_slice())
            .map(VehicleId::from_be_bytes)
            .map_err(|_| StoreError::Serialization(format!("corrupt plate index {number_plate}")))?;
        self.get_vehicle(id)
    }

    fn create_vehicle<F>(&self, f: F) -> Result<Vehicle>
    where
        F: FnOnce(&mut Vehicle) -> Result<bool>,
    {
        let id = VehicleId::new(self.next_id_i32(seq::VEHICLE)?);
        let now = Utc::now();
        let mut vehicle = Vehicle::blank(id, now);
        if !f(&mut vehicle)? {
            return Err(StoreError::Aborted);
        }
        vehicle.id = id;
        vehicle.created_at = now;
        vehicle.updated_at = now;
        Self::validate_vehicle(&vehicle)?;

        self.claim_plate(&vehicle.number_plate, id)?;
        self.put(cf::VEHICLES, &id.to_be_bytes(), &vehicle)?;
        tracing::debug!(vehicle_id = %id, plate = %vehicle.number_plate, "Created vehicle");
        Ok(vehicle)
    }

    fn update_vehicle<F>(&self, id: VehicleId, f: F) -> Result<Vehicle>
    where
        F: FnOnce(&mut Vehicle) -> Result<bool>,
    {
        let prev: Vehicle = self
            .get_for_update(cf::VEHICLES, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("vehicle", id))?;

        let mut vehicle = prev.clone();
        if !f(&mut vehicle)? {
            return Ok(prev);
        }
        vehicle.id = prev.id;
        vehicle.created_at = prev.created_at;
        vehicle.updated_at = Utc::now();
        Self::validate_vehicle(&vehicle)?;

        if vehicle.number_plate != prev.number_plate {
            self.claim_plate(&vehicle.number_plate, id)?;
            self.delete(cf::VEHICLES_BY_PLATE, prev.number_plate.as_bytes())?;
        }
        self.put(cf::VEHICLES, &id.to_be_bytes(), &vehicle)?;
        Ok(vehicle)
    }

    fn delete_vehicle(&self, id: VehicleId) -> Result<()> {
        let vehicle: Vehicle = self
            .get_for_update(cf::VEHICLES, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("vehicle", id))?;
        self.delete(cf::VEHICLES_BY_PLATE, vehicle.number_plate.as_bytes())?;
        self.delete(cf::VEHICLES, &id.to_be_bytes())
    }
}

impl ImageRepository for StoreTx<'_> {
    fn get_all_images(&self) -> Result<Vec<Image>> {
        self.scan_values(cf::IMAGES)
    }

    fn get_image(&self, id: ImageId) -> Result<Image> {
        self.get(cf::IMAGES, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::not_found("image", id))
    }

    fn create_image<F>(&self, f: F) -> Result<Image>
    where
        F: FnOnce(&mut Image) -> Result<bool>,
    {
        let id = ImageId::new(self.next_id_i32(seq::IMAGE)?);
        let now = Utc::now();
        let mut image = Image::blank(id, now);
        if !f(&mut image)? {
            return Err(StoreError::Aborted);
        }
        if image.url.trim().is_empty() {
            return Err(StoreError::Validation("image url must not be empty".into()));
        }
        image.id = id;
        image.created_at = now;
        image.updated_at = now;
        self.put(cf::IMAGES, &id.to_be_bytes(), &image)?;
        Ok(image)
    }

    fn delete_image(&self, id: ImageId) -> Result<()> {
        if self.get_raw_for_update(cf::IMAGES, &id.to_be_bytes())?.is_none() {
            return Err(StoreError::not_found("image", id));
        }
        self.unlink_image_id(id)?;
        self.delete(cf::IMAGES, &id.to_be_bytes())
    }
}
