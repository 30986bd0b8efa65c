use chrono::{DateTime, Utc};
use greenspace_core::geo::{validate_latitude, validate_longitude};
use greenspace_core::{MqttPayload, SensorDataId, SensorId};

use super::StoreTx;
use crate::error::{Result, StoreError};
use crate::keys;
use crate::repository::SensorRepository;
use crate::schema::{cf, seq};
use crate::types::{Sensor, SensorData};

impl StoreTx<'_> {
    fn validate_sensor(sensor: &Sensor) -> Result<()> {
        validate_latitude(sensor.latitude)?;
        validate_longitude(sensor.longitude)?;
        Ok(())
    }

    fn sensor_data_ids(&self, sensor_id: &SensorId) -> Result<Vec<SensorDataId>> {
        Ok(self
            .scan_prefix(cf::SENSOR_DATA_BY_SENSOR, &keys::sensor_prefix(sensor_id))?
            .iter()
            .filter_map(|(key, _)| keys::data_id_from_sensor_key(key))
            .collect())
    }
}

impl SensorRepository for StoreTx<'_> {
    fn get_all_sensors(&self) -> Result<Vec<Sensor>> {
        self.scan_values(cf::SENSORS)
    }

    fn get_sensor(&self, id: &SensorId) -> Result<Sensor> {
        self.get(cf::SENSORS, id.as_bytes())?
            .ok_or_else(|| StoreError::not_found("sensor", id))
    }

    fn find_sensor_for_update(&self, id: &SensorId) -> Result<Option<Sensor>> {
        self.get_for_update(cf::SENSORS, id.as_bytes())
    }

    fn create_sensor<F>(&self, id: SensorId, f: F) -> Result<Sensor>
    where
        F: FnOnce(&mut Sensor) -> Result<bool>,
    {
        if self.get_raw_for_update(cf::SENSORS, id.as_bytes())?.is_some() {
            return Err(StoreError::Duplicate(format!("sensor {id} already exists")));
        }
        let now = Utc::now();
        let mut sensor = Sensor::blank(id.clone(), now);
        if !f(&mut sensor)? {
            return Err(StoreError::Aborted);
        }
        sensor.id = id;
        sensor.created_at = now;
        sensor.updated_at = now;
        Self::validate_sensor(&sensor)?;

        self.put(cf::SENSORS, sensor.id.as_bytes(), &sensor)?;
        tracing::debug!(sensor_id = %sensor.id, "Created sensor");
        Ok(sensor)
    }

    fn update_sensor<F>(&self, id: &SensorId, f: F) -> Result<Sensor>
    where
        F: FnOnce(&mut Sensor) -> Result<bool>,
    {
        let prev: Sensor = self
            .get_for_update(cf::SENSORS, id.as_bytes())?
            .ok_or_else(|| StoreError::not_found("sensor", id))?;

        let mut sensor = prev.clone();
        if !f(&mut sensor)? {
            return Ok(prev);
        }
        sensor.id = prev.id;
        sensor.created_at = prev.created_at;
        sensor.updated_at = Utc::now();
        Self::validate_sensor(&sensor)?;

        self.put(cf::SENSORS, id.as_bytes(), &sensor)?;
        Ok(sensor)
    }

    fn delete_sensor(&self, id: &SensorId) -> Result<()> {
        if self.get_raw_for_update(cf::SENSORS, id.as_bytes())?.is_none() {
            return Err(StoreError::not_found("sensor", id));
        }
        for data_id in self.sensor_data_ids(id)? {
            self.delete(cf::SENSOR_DATA, &data_id.to_be_bytes())?;
            self.delete(cf::SENSOR_DATA_BY_SENSOR, &keys::sensor_data_key(id, data_id))?;
        }
        self.delete(cf::SENSORS, id.as_bytes())?;
        tracing::debug!(sensor_id = %id, "Deleted sensor");
        Ok(())
    }

    fn insert_sensor_data(
        &self,
        sensor_id: &SensorId,
        payload: MqttPayload,
        created_at: DateTime<Utc>,
    ) -> Result<SensorData> {
        let mut sensor: Sensor = self
            .get_for_update(cf::SENSORS, sensor_id.as_bytes())?
            .ok_or_else(|| StoreError::not_found("sensor", sensor_id))?;

        let id = SensorDataId::new(self.next_id(seq::SENSOR_DATA)?);
        let data = SensorData {
            id,
            sensor_id: sensor_id.clone(),
            payload,
            created_at,
            updated_at: created_at,
        };
        self.put(cf::SENSOR_DATA, &id.to_be_bytes(), &data)?;
        self.put_raw(
            cf::SENSOR_DATA_BY_SENSOR,
            &keys::sensor_data_key(sensor_id, id),
            &[],
        )?;

        let is_newest = sensor
            .latest_data
            .as_ref()
            .map_or(true, |latest| latest.created_at <= created_at);
        if is_newest {
            sensor.latest_data = Some(data.clone());
            sensor.updated_at = Utc::now();
            self.put(cf::SENSORS, sensor_id.as_bytes(), &sensor)?;
        }
        Ok(data)
    }

    fn get_latest_sensor_data_by_sensor_id(
        &self,
        sensor_id: &SensorId,
    ) -> Result<Option<SensorData>> {
        let sensor: Option<Sensor> = self.get(cf::SENSORS, sensor_id.as_bytes())?;
        Ok(sensor.and_then(|s| s.latest_data))
    }

    fn list_sensor_data(&self, sensor_id: &SensorId) -> Result<Vec<SensorData>> {
        let mut data = Vec::new();
        for data_id in self.sensor_data_ids(sensor_id)? {
            if let Some(row) = self.get(cf::SENSOR_DATA, &data_id.to_be_bytes())? {
                data.push(row);
            }
        }
        Ok(data)
    }
}
