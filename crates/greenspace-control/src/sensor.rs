//! Sensor service and the telemetry ingestion pipeline.
//!
//! An incoming message upserts its sensor, stores the reading and binds the
//! sensor to the nearest tree in one transaction. The `NewSensorData` event
//! is published only after that transaction has committed.

use std::sync::Arc;

use chrono::Utc;
use greenspace_core::{ErrorKind, MqttPayload, Result, SensorId, SensorStatus, ServiceError};
use greenspace_events::{Event, EventBus};
use greenspace_store::{Sensor, SensorData, SensorRepository, Store, TreeRepository};

use crate::publish;
use crate::types::ControlConfig;

/// Sensor CRUD and message ingestion.
pub struct SensorService<S: Store> {
    store: Arc<S>,
    bus: Arc<EventBus>,
    config: ControlConfig,
}

impl<S: Store> SensorService<S> {
    /// Create a new sensor service.
    #[must_use]
    pub fn new(store: Arc<S>, bus: Arc<EventBus>, config: ControlConfig) -> Self {
        Self { store, bus, config }
    }

    /// Decode a raw broker message and ingest it.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an empty or malformed body, plus the errors of
    /// [`SensorService::handle_message`].
    pub async fn handle_raw_message(&self, body: &[u8]) -> Result<SensorData> {
        let payload: Option<MqttPayload> = serde_json::from_slice(body)
            .map_err(|e| ServiceError::bad_request(format!("malformed payload: {e}")))?;
        let payload = payload.ok_or_else(|| ServiceError::bad_request("empty payload"))?;
        self.handle_message(payload).await
    }

    /// Ingest one telemetry message.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if the payload fails validation and `Internal`
    /// if the database operation fails. Nothing is written in either case.
    pub async fn handle_message(&self, payload: MqttPayload) -> Result<SensorData> {
        let sensor_id = payload.validate()?;
        let position = payload.position();
        let radius = self.config.nearest_tree_radius_m;
        let received_at = Utc::now();

        let data = self
            .store
            .with_tx(|tx| {
                let set_online = |sensor: &mut Sensor| {
                    sensor.status = SensorStatus::Online;
                    if let Some((lat, lon)) = position {
                        sensor.latitude = lat;
                        sensor.longitude = lon;
                    }
                    Ok(true)
                };
                if tx.find_sensor_for_update(&sensor_id)?.is_some() {
                    tx.update_sensor(&sensor_id, set_online)?;
                } else {
                    tx.create_sensor(sensor_id.clone(), set_online)?;
                    tracing::info!(sensor_id = %sensor_id, "Registered new sensor");
                }

                let data = tx.insert_sensor_data(&sensor_id, payload, received_at)?;

                if let Some((lat, lon)) = position {
                    bind_nearest_tree(tx, &sensor_id, lat, lon, radius)?;
                }
                Ok::<_, ServiceError>(data)
            })
            .map_err(|e| {
                tracing::error!(sensor_id = %sensor_id, error = %e, "Failed to ingest reading");
                storage_failure(e)
            })?;

        tracing::debug!(sensor_id = %sensor_id, data_id = %data.id, "Stored sensor reading");
        publish(&self.bus, Event::NewSensorData { new: data.clone() }).await;
        Ok(data)
    }

    /// List every sensor.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the database operation fails.
    pub async fn get_all(&self) -> Result<Vec<Sensor>> {
        self.store.with_tx(|tx| Ok(tx.get_all_sensors()?))
    }

    /// Get a sensor by ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the sensor doesn't exist.
    pub async fn get_by_id(&self, id: &SensorId) -> Result<Sensor> {
        self.store.with_tx(|tx| Ok(tx.get_sensor(id)?))
    }

    /// Latest reading of a sensor.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the sensor doesn't exist or has no readings.
    pub async fn get_latest_data(&self, id: &SensorId) -> Result<SensorData> {
        self.get_by_id(id)
            .await?
            .latest_data
            .ok_or_else(|| ServiceError::not_found(format!("sensor {id} has no readings")))
    }

    /// All readings of a sensor, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the sensor doesn't exist.
    pub async fn list_data(&self, id: &SensorId) -> Result<Vec<SensorData>> {
        self.store.with_tx(|tx| {
            tx.get_sensor(id)?;
            Ok(tx.list_sensor_data(id)?)
        })
    }

    /// Set a sensor's status.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the sensor doesn't exist.
    pub async fn update_status(&self, id: &SensorId, status: SensorStatus) -> Result<Sensor> {
        let sensor = self.store.with_tx(|tx| {
            Ok::<_, ServiceError>(tx.update_sensor(id, |sensor| {
                if sensor.status == status {
                    return Ok(false);
                }
                sensor.status = status;
                Ok(true)
            })?)
        })?;
        tracing::info!(sensor_id = %id, status = %status, "Updated sensor status");
        Ok(sensor)
    }

    /// Delete a sensor and its readings, unbinding its tree first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the sensor doesn't exist.
    pub async fn delete(&self, id: &SensorId) -> Result<()> {
        self.store.with_tx(|tx| {
            tx.unlink_sensor_id(id)?;
            tx.delete_sensor(id)?;
            Ok::<_, ServiceError>(())
        })?;
        tracing::info!(sensor_id = %id, "Deleted sensor");
        Ok(())
    }
}

/// Bind the sensor to the closest tree within `radius` metres.
///
/// A failed lookup skips the binding.
/// The payload is validated before the transaction, so whatever fails
/// inside it, lock timeouts included, is a storage failure.
fn storage_failure(err: ServiceError) -> ServiceError {
    if err.kind() == ErrorKind::Internal {
        err
    } else {
        ServiceError::internal(err.message())
    }
}

fn bind_nearest_tree<T>(
    tx: &T,
    sensor_id: &SensorId,
    latitude: f64,
    longitude: f64,
    radius: f64,
) -> Result<()>
where
    T: TreeRepository,
{
    let tree = match tx.find_nearest_tree(latitude, longitude, radius) {
        Ok(Some(tree)) => tree,
        Ok(None) => return Ok(()),
        Err(e) => {
            tracing::warn!(sensor_id = %sensor_id, error = %e, "Nearest tree lookup failed");
            return Ok(());
        }
    };
    if tree.sensor_id.as_ref() == Some(sensor_id) {
        return Ok(());
    }

    tx.unlink_sensor_id(sensor_id)?;
    tx.update_tree(tree.id, |t| {
        t.sensor_id = Some(sensor_id.clone());
        Ok(true)
    })?;
    tracing::info!(sensor_id = %sensor_id, tree_id = %tree.id, "Bound sensor to nearest tree");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use crate::types::TreeRequest;
    use greenspace_core::Watermark;
    use greenspace_events::EventType;
    use greenspace_store::StoreError;

    #[test]
    fn ingest_storage_failures_are_internal() {
        // A RocksDB lock timeout surfaces from the store as a conflict.
        let busy = ServiceError::from(StoreError::Conflict("lock timeout".into()));
        assert_eq!(busy.kind(), ErrorKind::Conflict);

        let mapped = storage_failure(busy);
        assert_eq!(mapped.kind(), ErrorKind::Internal);
        assert!(mapped.message().contains("lock timeout"));

        let internal = ServiceError::internal("disk full");
        assert_eq!(storage_failure(internal).message(), "disk full");
    }

    fn payload(device: &str, position: Option<(f64, f64)>) -> MqttPayload {
        MqttPayload {
            device_id: device.to_string(),
            battery: 3.4,
            humidity: 51.0,
            temperature: 12.5,
            latitude: position.map(|p| p.0),
            longitude: position.map(|p| p.1),
            watermarks: vec![
                Watermark::new(30, 20, 1200),
                Watermark::new(60, 22, 1300),
                Watermark::new(90, 24, 1400),
            ],
        }
    }

    #[tokio::test]
    async fn unseen_device_creates_online_sensor() {
        let h = Harness::new();
        let mut rx = h.subscribe(EventType::NewSensorData).await;
        let run = h.run_bus();

        let data = h
            .sensors
            .handle_message(payload("eui-new", Some((54.82, 9.48))))
            .await
            .unwrap();

        let sensor = h.sensors.get_by_id(&data.sensor_id).await.unwrap();
        assert_eq!(sensor.status, SensorStatus::Online);
        assert!((sensor.latitude - 54.82).abs() < f64::EPSILON);
        assert_eq!(sensor.latest_data.map(|d| d.id), Some(data.id));
        assert_eq!(h.sensors.list_data(&data.sensor_id).await.unwrap().len(), 1);

        match h.next_event(&mut rx).await.as_ref() {
            Event::NewSensorData { new } => assert_eq!(new.id, data.id),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(h.no_event(&mut rx).await);
        h.stop(run).await;
    }

    #[tokio::test]
    async fn invalid_payload_has_no_side_effects() {
        let h = Harness::new();
        let err = h
            .sensors
            .handle_message(payload("eui-bad", Some((95.0, 9.48))))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        let err = h.sensors.handle_message(payload("", None)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert!(h.sensors.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn raw_messages_are_decoded() {
        let h = Harness::new();
        assert_eq!(
            h.sensors.handle_raw_message(b"null").await.unwrap_err().kind(),
            ErrorKind::BadRequest
        );
        assert_eq!(
            h.sensors.handle_raw_message(b"{not json").await.unwrap_err().kind(),
            ErrorKind::BadRequest
        );
        let body = serde_json::to_vec(&payload("eui-raw", None)).unwrap();
        let data = h.sensors.handle_raw_message(&body).await.unwrap();
        assert_eq!(data.sensor_id.as_str(), "eui-raw");
    }

    #[tokio::test]
    async fn binds_only_within_radius() {
        let h = Harness::new();
        let near = h
            .trees
            .create(TreeRequest::new("T-near", 2023, 54.821_52, 9.487_15))
            .await
            .unwrap();

        // About 11 m north of the tree.
        h.sensors
            .handle_message(payload("eui-far", Some((54.821_62, 9.487_15))))
            .await
            .unwrap();
        assert!(h.trees.get_by_id(near.id).await.unwrap().sensor_id.is_none());

        h.sensors
            .handle_message(payload("eui-near", Some((54.821_53, 9.487_15))))
            .await
            .unwrap();
        assert_eq!(
            h.trees.get_by_id(near.id).await.unwrap().sensor_id.map(String::from),
            Some("eui-near".to_string())
        );
    }

    #[tokio::test]
    async fn rebinding_moves_the_sensor() {
        let h = Harness::new();
        let first = h
            .trees
            .create(TreeRequest::new("T-1", 2023, 54.80, 9.40))
            .await
            .unwrap();
        let second = h
            .trees
            .create(TreeRequest::new("T-2", 2023, 54.81, 9.41))
            .await
            .unwrap();

        h.sensors
            .handle_message(payload("eui-move", Some((54.80, 9.40))))
            .await
            .unwrap();
        h.sensors
            .handle_message(payload("eui-move", Some((54.81, 9.41))))
            .await
            .unwrap();

        assert!(h.trees.get_by_id(first.id).await.unwrap().sensor_id.is_none());
        assert!(h.trees.get_by_id(second.id).await.unwrap().sensor_id.is_some());
        let id = SensorId::new("eui-move").unwrap();
        assert_eq!(h.sensors.list_data(&id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_unbinds_tree() {
        let h = Harness::new();
        let tree = h
            .trees
            .create(TreeRequest::new("T-1", 2023, 54.80, 9.40))
            .await
            .unwrap();
        let data = h
            .sensors
            .handle_message(payload("eui-del", Some((54.80, 9.40))))
            .await
            .unwrap();
        assert!(h.trees.get_by_id(tree.id).await.unwrap().sensor_id.is_some());

        h.sensors.delete(&data.sensor_id).await.unwrap();
        assert!(h.trees.get_by_id(tree.id).await.unwrap().sensor_id.is_none());
        assert_eq!(
            h.sensors.get_by_id(&data.sensor_id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn status_update() {
        let h = Harness::new();
        let data = h.sensors.handle_message(payload("eui-s", None)).await.unwrap();
        let sensor = h
            .sensors
            .update_status(&data.sensor_id, SensorStatus::Offline)
            .await
            .unwrap();
        assert_eq!(sensor.status, SensorStatus::Offline);
        assert_eq!(
            h.sensors.get_latest_data(&data.sensor_id).await.unwrap().id,
            data.id
        );
    }
}
